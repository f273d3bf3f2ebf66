use std::collections::HashSet;

/// Answers "may this identity manage tickets in this scope".
pub trait PrivilegeCheck: Send + Sync {
    fn is_privileged(&self, scope: &str, user_id: &str) -> bool;
}

impl<F> PrivilegeCheck for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_privileged(&self, scope: &str, user_id: &str) -> bool {
        self(scope, user_id)
    }
}

/// Fixed set of administrator identities, valid in every scope.
#[derive(Debug, Clone, Default)]
pub struct AdminList {
    admins: HashSet<String>,
}

impl AdminList {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admins: admins.into_iter().map(Into::into).collect(),
        }
    }
}

impl PrivilegeCheck for AdminList {
    fn is_privileged(&self, _scope: &str, user_id: &str) -> bool {
        self.admins.contains(user_id)
    }
}
