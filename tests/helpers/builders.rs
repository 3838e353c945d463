use sea_orm::DatabaseConnection;
use visadesk::entities;
use visadesk::storage::{self, NewUser};

/// Builder for creating test users
pub struct UserBuilder {
    username: String,
    password: String,
    email: Option<String>,
    role: String,
    enabled: bool,
}

impl UserBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            password: "password123".to_string(),
            email: None,
            role: "staff".to_string(),
            enabled: true,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> entities::user::Model {
        let user = storage::create_user(
            db,
            NewUser {
                username: self.username,
                password: self.password,
                email: self.email,
                role: self.role,
            },
        )
        .await
        .expect("Failed to create test user");

        if !self.enabled {
            storage::set_user_enabled(db, user.id, false)
                .await
                .expect("Failed to disable user");

            storage::get_user(db, user.id)
                .await
                .expect("Failed to get updated user")
                .expect("User not found")
        } else {
            user
        }
    }
}

/// Builder for role defaults and user overrides
pub struct GrantBuilder {
    entries: Vec<storage::GrantEntry>,
}

impl GrantBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn grant(mut self, permission: &entities::permission::Model) -> Self {
        self.entries.push(storage::GrantEntry {
            permission_id: permission.id,
            granted: true,
        });
        self
    }

    pub fn deny(mut self, permission: &entities::permission::Model) -> Self {
        self.entries.push(storage::GrantEntry {
            permission_id: permission.id,
            granted: false,
        });
        self
    }

    pub fn entries(&self) -> &[storage::GrantEntry] {
        &self.entries
    }

    pub async fn apply_to_role(self, db: &DatabaseConnection, role: &str) {
        storage::set_role_permissions(db, role, &self.entries)
            .await
            .expect("Failed to set role permissions");
    }

    pub async fn apply_to_user(self, db: &DatabaseConnection, user_id: i32) {
        storage::set_user_permissions(db, user_id, &self.entries)
            .await
            .expect("Failed to set user permissions");
    }
}
