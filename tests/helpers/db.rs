use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;
use visadesk::entities;
use visadesk::storage::{self, NewPermission, NewUser};

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

/// Create a test user with the given role
pub async fn seed_test_user(
    db: &DatabaseConnection,
    username: &str,
    role: &str,
) -> entities::user::Model {
    storage::create_user(
        db,
        NewUser {
            username: username.to_string(),
            password: "password123".to_string(),
            email: None,
            role: role.to_string(),
        },
    )
    .await
    .expect("Failed to create test user")
}

/// Create a permission whose category is the code's prefix
pub async fn seed_permission(db: &DatabaseConnection, code: &str) -> entities::permission::Model {
    let category = code.split('.').next().unwrap_or("general").to_string();
    storage::create_permission(
        db,
        NewPermission {
            code: code.to_string(),
            name: format!("Test {code}"),
            description: None,
            category,
        },
    )
    .await
    .expect("Failed to create test permission")
}
