use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{Display, EnumString};

//  PERMISSIONS

/// Authorization classes known to the helpdesk. Claims and user records carry
/// the code as a plain string; the authorization middleware only compares codes.
#[derive(Debug, Serialize, Deserialize, Display, EnumString, PartialEq, Eq, Clone, Copy, Default)]
#[strum(ascii_case_insensitive)]
pub enum Permission {
    #[strum(serialize = "ADM")]
    #[serde(rename = "ADM")]
    Administrator,
    #[strum(serialize = "TEC")]
    #[serde(rename = "TEC")]
    Technician,
    #[strum(serialize = "TEC_AUX")]
    #[serde(rename = "TEC_AUX")]
    AssistantTechnician,
    #[strum(serialize = "CAD")]
    #[serde(rename = "CAD")]
    Registrar,
    #[default]
    #[strum(serialize = "USR")]
    #[serde(rename = "USR")]
    User,
    #[strum(serialize = "DEV")]
    #[serde(rename = "DEV")]
    Developer,
}

//  USERS

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct User {
    pub id: String,
    pub login: String,
    #[sqlx(rename = "nome")]
    pub name: String,
    pub email: String,
    #[sqlx(rename = "permissao")]
    pub permission: String,
    pub status: bool,
    pub avatar: Option<String>,
    #[sqlx(rename = "ultimo_login")]
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A user about to be provisioned; id and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub login: String,
    pub name: String,
    pub email: String,
    pub permission: String,
    pub status: bool,
}

impl NewUser {
    /// First-login provisioning: ordinary user, active.
    pub fn provisioned(login: String, name: String, email: String) -> Self {
        NewUser {
            login,
            name,
            email,
            permission: Permission::default().to_string(),
            status: true,
        }
    }
}

//Public Profile Response
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PublicProfile {
    pub id: String,
    pub nome: String,
    pub login: String,
    pub email: String,
    pub permissao: String,
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        PublicProfile {
            id: user.id,
            nome: user.name,
            login: user.login,
            email: user.email,
            permissao: user.permission,
            status: user.status,
            avatar: user.avatar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn permission_codes_round_trip_through_strings() {
        assert_eq!(Permission::Administrator.to_string(), "ADM");
        assert_eq!(Permission::AssistantTechnician.to_string(), "TEC_AUX");
        assert_eq!(Permission::from_str("usr").unwrap(), Permission::User);
        assert!(Permission::from_str("ROOT").is_err());
    }

    #[test]
    fn provisioned_users_are_active_ordinary_users() {
        let user = NewUser::provisioned("jdoe".into(), "John Doe".into(), "jdoe@corp".into());
        assert_eq!(user.permission, "USR");
        assert!(user.status);
    }
}
