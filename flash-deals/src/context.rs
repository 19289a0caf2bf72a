//! Request-scoped caller identity
//!
//! Built once at the edge of a request from the authenticated session and passed by
//! reference to every service call that needs to know who is asking.

use crate::errors::OrderError;
use serde::{Deserialize, Serialize};

/// Public view of a signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: i64,
    pub nick_name: String,
    pub icon: String,
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<UserDto>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn for_user(user: UserDto) -> Self {
        Self { user: Some(user) }
    }

    pub fn caller_id(&self) -> Result<i64, OrderError> {
        self.user
            .as_ref()
            .map(|u| u.id)
            .ok_or(OrderError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_id() {
        let ctx = RequestContext::for_user(UserDto {
            id: 1010,
            nick_name: "user_abc".to_string(),
            icon: String::new(),
        });
        assert_eq!(ctx.caller_id().unwrap(), 1010);

        assert!(matches!(
            RequestContext::anonymous().caller_id(),
            Err(OrderError::Unauthenticated)
        ));
    }

    #[test]
    fn test_user_serializes_camel_case() {
        let user = UserDto {
            id: 1,
            nick_name: "deal_hunter".to_string(),
            icon: "/imgs/icons/1.jpg".to_string(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["nickName"], "deal_hunter");
    }
}
