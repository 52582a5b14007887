use chrono::Utc;
use whisper_types::{Contact, PresenceState};

use crate::error::{ChatError, Result};

/// Partial change to a stored contact. `None` fields are left as they are.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ContactPatch {
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub is_favorite: Option<bool>,
    pub is_blocked: Option<bool>,
    pub presence_state: Option<PresenceState>,
}

/// The local user's contacts, in the order they were added.
#[derive(Debug, Default, Clone)]
pub struct ContactBook {
    contacts: Vec<Contact>,
}

impl ContactBook {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }

    pub fn all(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn get(&self, id: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == id)
    }

    /// A contact a chat may be opened with: known and not blocked.
    pub fn reachable(&self, id: &str) -> Result<&Contact> {
        match self.get(id) {
            Some(c) if !c.is_blocked => Ok(c),
            _ => Err(ChatError::InvalidParticipant(id.to_string())),
        }
    }

    pub fn add(&mut self, contact: Contact) -> Result<Contact> {
        if contact.id.trim().is_empty() || self.get(&contact.id).is_some() {
            return Err(ChatError::InvalidParticipant(contact.id));
        }
        check_name(&contact.id, &contact.display_name)?;
        self.contacts.push(contact.clone());
        Ok(contact)
    }

    /// Replace a stored contact, keeping its position.
    pub fn update(&mut self, contact: Contact) -> Result<Contact> {
        check_name(&contact.id, &contact.display_name)?;
        let slot = self
            .contacts
            .iter_mut()
            .find(|c| c.id == contact.id)
            .ok_or_else(|| ChatError::ContactNotFound(contact.id.clone()))?;
        *slot = contact.clone();
        Ok(contact)
    }

    /// Returns the removed contact, or `None` if it was not there.
    pub fn remove(&mut self, id: &str) -> Option<Contact> {
        let idx = self.contacts.iter().position(|c| c.id == id)?;
        Some(self.contacts.remove(idx))
    }

    pub fn set_favorite(&mut self, id: &str, favorite: bool) -> Result<Contact> {
        self.modify(id, |c| c.is_favorite = favorite)
    }

    pub fn set_blocked(&mut self, id: &str, blocked: bool) -> Result<Contact> {
        self.modify(id, |c| c.is_blocked = blocked)
    }

    /// Record a presence change. Going offline stamps `last_seen_at`.
    pub fn set_presence(&mut self, id: &str, presence: PresenceState) -> Result<Contact> {
        self.modify(id, |c| apply_presence(c, presence))
    }

    /// Apply every field of `patch` at once. Nothing changes if any field is
    /// rejected.
    pub fn patch(&mut self, id: &str, patch: ContactPatch) -> Result<Contact> {
        if let Some(name) = &patch.display_name {
            check_name(id, name)?;
        }
        self.modify(id, |c| {
            if let Some(name) = patch.display_name {
                c.display_name = name;
            }
            if let Some(avatar) = patch.avatar_ref {
                c.avatar_ref = avatar;
            }
            if let Some(favorite) = patch.is_favorite {
                c.is_favorite = favorite;
            }
            if let Some(blocked) = patch.is_blocked {
                c.is_blocked = blocked;
            }
            if let Some(presence) = patch.presence_state {
                apply_presence(c, presence);
            }
        })
    }

    /// Case-insensitive substring match on the display name. An empty query
    /// matches everyone.
    pub fn search(&self, query: &str) -> Vec<&Contact> {
        let needle = query.trim().to_lowercase();
        self.contacts
            .iter()
            .filter(|c| needle.is_empty() || c.display_name.to_lowercase().contains(&needle))
            .collect()
    }

    fn modify<F>(&mut self, id: &str, f: F) -> Result<Contact>
    where
        F: FnOnce(&mut Contact),
    {
        let contact = self
            .contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ChatError::ContactNotFound(id.to_string()))?;
        f(contact);
        Ok(contact.clone())
    }
}

fn check_name(id: &str, display_name: &str) -> Result<()> {
    if display_name.trim().is_empty() {
        return Err(ChatError::InvalidParticipant(id.to_string()));
    }
    Ok(())
}

/// Going offline, or any change while online, stamps `last_seen_at`.
fn apply_presence(contact: &mut Contact, presence: PresenceState) {
    if contact.presence_state != PresenceState::Offline || presence == PresenceState::Offline {
        contact.last_seen_at = Utc::now();
    }
    contact.presence_state = presence;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> ContactBook {
        let mut book = ContactBook::default();
        book.add(Contact::new("demo-1", "Alice Cooper")).unwrap();
        book.add(Contact::new("demo-2", "Bob Wilson")).unwrap();
        book.add(Contact::new("demo-3", "Carol Smith")).unwrap();
        book
    }

    #[test]
    fn duplicate_and_blank_contacts_rejected() {
        let mut book = book();
        assert_eq!(
            book.add(Contact::new("demo-1", "Again")).unwrap_err(),
            ChatError::InvalidParticipant("demo-1".into())
        );
        assert!(book.add(Contact::new("x", "   ")).is_err());
        assert_eq!(book.all().len(), 3);
    }

    #[test]
    fn search_is_case_insensitive() {
        let book = book();
        let hits: Vec<&str> = book.search("SMI").iter().map(|c| c.id.as_str()).collect();
        assert_eq!(hits, ["demo-3"]);
        assert_eq!(book.search("").len(), 3);
        assert!(book.search("zed").is_empty());
    }

    #[test]
    fn blocked_contact_is_unreachable() {
        let mut book = book();
        assert!(book.reachable("demo-2").is_ok());
        book.set_blocked("demo-2", true).unwrap();
        assert_eq!(
            book.reachable("demo-2").unwrap_err(),
            ChatError::InvalidParticipant("demo-2".into())
        );
        assert!(book.reachable("nobody").is_err());
    }

    #[test]
    fn modify_unknown_contact_fails() {
        let mut book = book();
        assert_eq!(
            book.set_favorite("ghost", true).unwrap_err(),
            ChatError::ContactNotFound("ghost".into())
        );
        assert!(book.set_favorite("demo-1", true).unwrap().is_favorite);
        assert!(book.remove("demo-1").is_some());
        assert!(book.remove("demo-1").is_none());
    }

    #[test]
    fn blank_name_rejected_on_update_and_patch() {
        let mut book = book();
        let mut renamed = book.get("demo-1").unwrap().clone();
        renamed.display_name = "  ".into();
        assert_eq!(
            book.update(renamed).unwrap_err(),
            ChatError::InvalidParticipant("demo-1".into())
        );

        let patch = ContactPatch {
            display_name: Some("\t".into()),
            presence_state: Some(PresenceState::Online),
            is_favorite: Some(true),
            ..ContactPatch::default()
        };
        assert!(book.patch("demo-1", patch).is_err());
        let untouched = book.get("demo-1").unwrap();
        assert_eq!(untouched.presence_state, PresenceState::Offline);
        assert!(!untouched.is_favorite);
        assert_eq!(untouched.display_name, "Alice Cooper");
    }

    #[test]
    fn patch_applies_all_fields() {
        let mut book = book();
        let patch = ContactPatch {
            display_name: Some("Alice C.".into()),
            avatar_ref: Some("avatars/alice.png".into()),
            is_blocked: Some(true),
            presence_state: Some(PresenceState::Away),
            ..ContactPatch::default()
        };
        let c = book.patch("demo-1", patch).unwrap();
        assert_eq!(c.display_name, "Alice C.");
        assert_eq!(c.avatar_ref, "avatars/alice.png");
        assert!(c.is_blocked);
        assert!(!c.is_favorite);
        assert_eq!(c.presence_state, PresenceState::Away);
        assert_eq!(
            book.patch("ghost", ContactPatch::default()).unwrap_err(),
            ChatError::ContactNotFound("ghost".into())
        );
    }
}
