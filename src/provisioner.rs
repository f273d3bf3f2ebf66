use std::sync::Arc;
use tracing::{info, warn};

use crate::platform::{Acl, AclSubject, ChannelHandle, ChannelPlatform, ParentScope, PlatformError};

const NAME_HINT_MAX_CHARS: usize = 24;
const OWNER_SUFFIX_CHARS: usize = 4;

/// Creates private ticket channels on the platform.
pub struct SessionProvisioner {
    platform: Arc<dyn ChannelPlatform>,
    system_actor: String,
}

impl SessionProvisioner {
    pub fn new(platform: Arc<dyn ChannelPlatform>, system_actor: impl Into<String>) -> Self {
        Self {
            platform,
            system_actor: system_actor.into(),
        }
    }

    /// Access for the system actor, the requester and each privileged role;
    /// everyone else is denied.
    pub fn ticket_acl(&self, requester_id: &str, roles: &[String]) -> Acl {
        let mut allow = vec![
            AclSubject::User(self.system_actor.clone()),
            AclSubject::User(requester_id.to_string()),
        ];
        for role in roles {
            let subject = AclSubject::Role(role.clone());
            if !allow.contains(&subject) {
                allow.push(subject);
            }
        }
        Acl {
            deny_default: true,
            allow,
        }
    }

    pub async fn create(
        &self,
        name_hint: &str,
        requester_id: &str,
        parent: &ParentScope,
        acl: &Acl,
    ) -> Result<ChannelHandle, PlatformError> {
        let name = channel_name(name_hint, requester_id);
        match self.platform.create_channel(&name, parent, acl).await {
            Ok(handle) => {
                info!(channel_id = %handle.id, name = %name, "provisioned ticket channel");
                Ok(handle)
            }
            Err(PlatformError::PartiallyCreated { handle, reason }) => {
                if let Err(e) = self.platform.delete_channel(&handle).await {
                    warn!(channel_id = %handle.id, error = %e, "could not clean up partial channel");
                }
                Err(PlatformError::PartiallyCreated { handle, reason })
            }
            Err(e) => Err(e),
        }
    }
}

/// `ticket-<hint>-<owner>`: the hint lowercased and reduced to `[a-z0-9-]`,
/// capped in length, and suffixed with the tail of the requester id.
pub fn channel_name(name_hint: &str, requester_id: &str) -> String {
    let mut hint = String::new();
    for ch in name_hint.chars().flat_map(char::to_lowercase) {
        let ch = if ch.is_ascii_alphanumeric() { ch } else { '-' };
        if ch == '-' && (hint.is_empty() || hint.ends_with('-')) {
            continue;
        }
        if hint.chars().count() == NAME_HINT_MAX_CHARS {
            break;
        }
        hint.push(ch);
    }
    let hint = hint.trim_end_matches('-');
    let hint = if hint.is_empty() { "user" } else { hint };

    let owner: Vec<char> = requester_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    let owner: String = owner[owner.len().saturating_sub(OWNER_SUFFIX_CHARS)..]
        .iter()
        .map(char::to_ascii_lowercase)
        .collect();

    if owner.is_empty() {
        format!("ticket-{}", hint)
    } else {
        format!("ticket-{}-{}", hint, owner)
    }
}
