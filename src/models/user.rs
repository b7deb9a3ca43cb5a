// src/models/user.rs
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use validator::Validate;

pub type UserId = i64;

// ==================== USER ROLE ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UserRole {
    #[default]
    Member,
    Admin,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            UserRole::Member => "Member",
            UserRole::Admin => "Administrator",
        }
    }

    // ======== PERMISSIONS ========
    pub fn can_manage_users(&self) -> bool {
        self.is_admin()
    }

    pub fn can_view_all_datasets(&self) -> bool {
        self.is_admin()
    }
}

// ==================== USER ====================

/// An account as reported by the backend. Immutable on the client except for
/// the role, which the backend decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "UserDto")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub role: UserRole,
}

/// Wire shape: the backend sends either an explicit `role` or Django-style
/// staff flags.
#[derive(Debug, Deserialize)]
struct UserDto {
    id: UserId,
    username: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    is_staff: Option<bool>,
    #[serde(default)]
    is_superuser: Option<bool>,
}

impl From<UserDto> for User {
    fn from(dto: UserDto) -> Self {
        let role = match dto.role.as_deref().map(str::parse::<UserRole>) {
            Some(Ok(role)) => role,
            _ if dto.is_staff.unwrap_or(false) || dto.is_superuser.unwrap_or(false) => UserRole::Admin,
            _ => UserRole::Member,
        };

        User {
            id: dto.id,
            username: dto.username,
            email: dto.email.filter(|e| !e.is_empty()),
            role,
        }
    }
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

// ==================== AUTH REQUESTS ====================

#[derive(Debug, Clone, Serialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 150, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 150, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into().trim().to_string(),
            password: password.into(),
        }
    }
}

impl RegisterRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>, email: Option<String>) -> Self {
        Self {
            username: username.into().trim().to_string(),
            password: password.into(),
            email: email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
        }
    }
}
