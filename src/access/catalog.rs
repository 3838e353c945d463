//! Built-in permission catalog and default role grants.
//!
//! Seeding only fills gaps: permissions missing from the table are inserted,
//! and a role receives its defaults only while it has no grants at all, so
//! edits made through the admin API survive restarts.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::access::ADMIN_ROLE;
use crate::entities;
use crate::errors::DeskError;
use crate::settings::Settings;
use crate::storage::{self, NewUser};

pub mod codes {
    // Applications
    pub const APPLICATIONS_VIEW: &str = "applications.view";
    pub const APPLICATIONS_CREATE: &str = "applications.create";
    pub const APPLICATIONS_EDIT: &str = "applications.edit";
    pub const APPLICATIONS_DELETE: &str = "applications.delete";

    // Customers
    pub const CUSTOMERS_VIEW: &str = "customers.view";
    pub const CUSTOMERS_CREATE: &str = "customers.create";
    pub const CUSTOMERS_EDIT: &str = "customers.edit";
    pub const CUSTOMERS_DELETE: &str = "customers.delete";

    // Appointments
    pub const APPOINTMENTS_VIEW: &str = "appointments.view";
    pub const APPOINTMENTS_CREATE: &str = "appointments.create";
    pub const APPOINTMENTS_EDIT: &str = "appointments.edit";
    pub const APPOINTMENTS_DELETE: &str = "appointments.delete";

    // Visitors
    pub const VISITORS_VIEW: &str = "visitors.view";
    pub const VISITORS_CREATE: &str = "visitors.create";

    // Documents
    pub const DOCUMENTS_VIEW: &str = "documents.view";
    pub const DOCUMENTS_UPLOAD: &str = "documents.upload";
    pub const DOCUMENTS_DELETE: &str = "documents.delete";

    // Reports
    pub const REPORTS_VIEW: &str = "reports.view";

    // Services
    pub const SERVICES_VIEW: &str = "services.view";
    pub const SERVICES_MANAGE: &str = "services.manage";

    // Settings
    pub const SETTINGS_VIEW: &str = "settings.view";
    pub const SETTINGS_UPDATE: &str = "settings.update";

    // Users
    pub const USERS_VIEW: &str = "users.view";
    pub const USERS_CREATE: &str = "users.create";
    pub const USERS_EDIT: &str = "users.edit";
    pub const USERS_DELETE: &str = "users.delete";

    // Permissions
    pub const PERMISSIONS_VIEW: &str = "permissions.view";
    pub const PERMISSIONS_MANAGE: &str = "permissions.manage";
}

use codes::*;

/// A catalog row: code, display name, description, category.
pub struct CatalogEntry {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
}

const fn entry(
    code: &'static str,
    name: &'static str,
    description: &'static str,
    category: &'static str,
) -> CatalogEntry {
    CatalogEntry {
        code,
        name,
        description,
        category,
    }
}

pub const CATALOG: &[CatalogEntry] = &[
    entry(APPLICATIONS_VIEW, "View applications", "List and open visa applications", "applications"),
    entry(APPLICATIONS_CREATE, "Create applications", "Open new visa applications", "applications"),
    entry(APPLICATIONS_EDIT, "Edit applications", "Change application details and status", "applications"),
    entry(APPLICATIONS_DELETE, "Delete applications", "Remove visa applications", "applications"),
    entry(CUSTOMERS_VIEW, "View customers", "List and open customer records", "customers"),
    entry(CUSTOMERS_CREATE, "Create customers", "Register new customers", "customers"),
    entry(CUSTOMERS_EDIT, "Edit customers", "Change customer records", "customers"),
    entry(CUSTOMERS_DELETE, "Delete customers", "Remove customer records", "customers"),
    entry(APPOINTMENTS_VIEW, "View appointments", "See the appointment calendar", "appointments"),
    entry(APPOINTMENTS_CREATE, "Book appointments", "Book new appointments", "appointments"),
    entry(APPOINTMENTS_EDIT, "Edit appointments", "Reschedule or update appointments", "appointments"),
    entry(APPOINTMENTS_DELETE, "Cancel appointments", "Cancel and remove appointments", "appointments"),
    entry(VISITORS_VIEW, "View visitors", "See the visitor log", "visitors"),
    entry(VISITORS_CREATE, "Register visitors", "Add walk-in visitors to the log", "visitors"),
    entry(DOCUMENTS_VIEW, "View documents", "Open uploaded documents", "documents"),
    entry(DOCUMENTS_UPLOAD, "Upload documents", "Attach documents to applications", "documents"),
    entry(DOCUMENTS_DELETE, "Delete documents", "Remove uploaded documents", "documents"),
    entry(REPORTS_VIEW, "View reports", "Open dashboards and reports", "reports"),
    entry(SERVICES_VIEW, "View services", "See the offered visa services", "services"),
    entry(SERVICES_MANAGE, "Manage services", "Create and edit visa services and prices", "services"),
    entry(SETTINGS_VIEW, "View settings", "Read application settings", "settings"),
    entry(SETTINGS_UPDATE, "Update settings", "Change application settings", "settings"),
    entry(USERS_VIEW, "View users", "List staff and customer accounts", "users"),
    entry(USERS_CREATE, "Create users", "Create accounts", "users"),
    entry(USERS_EDIT, "Edit users", "Change accounts and roles", "users"),
    entry(USERS_DELETE, "Delete users", "Disable or remove accounts", "users"),
    entry(PERMISSIONS_VIEW, "View permissions", "Read the permission catalog and grants", "permissions"),
    entry(PERMISSIONS_MANAGE, "Manage permissions", "Edit the catalog, role defaults and user overrides", "permissions"),
];

/// Codes granted to each built-in role on first start. `admin` needs none.
pub const DEFAULT_ROLE_GRANTS: &[(&str, &[&str])] = &[
    (
        "staff",
        &[
            APPLICATIONS_VIEW,
            APPLICATIONS_CREATE,
            APPLICATIONS_EDIT,
            CUSTOMERS_VIEW,
            CUSTOMERS_CREATE,
            CUSTOMERS_EDIT,
            APPOINTMENTS_VIEW,
            APPOINTMENTS_CREATE,
            APPOINTMENTS_EDIT,
            VISITORS_VIEW,
            VISITORS_CREATE,
            DOCUMENTS_VIEW,
            DOCUMENTS_UPLOAD,
            REPORTS_VIEW,
            SERVICES_VIEW,
            USERS_VIEW,
        ],
    ),
    (
        "agent",
        &[
            APPLICATIONS_VIEW,
            APPLICATIONS_CREATE,
            CUSTOMERS_VIEW,
            CUSTOMERS_CREATE,
            APPOINTMENTS_VIEW,
            APPOINTMENTS_CREATE,
            DOCUMENTS_VIEW,
            DOCUMENTS_UPLOAD,
            SERVICES_VIEW,
        ],
    ),
    (
        "customer",
        &[
            APPLICATIONS_VIEW,
            APPOINTMENTS_VIEW,
            APPOINTMENTS_CREATE,
            DOCUMENTS_VIEW,
            DOCUMENTS_UPLOAD,
            SERVICES_VIEW,
        ],
    ),
    ("user", &[SERVICES_VIEW]),
];

/// What a seeding run changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_inserted: usize,
    pub roles_seeded: Vec<String>,
}

/// Insert missing catalog permissions and first-run role defaults.
pub async fn seed_catalog(db: &DatabaseConnection) -> Result<SeedReport, DeskError> {
    let mut report = SeedReport::default();
    let txn = db.begin().await?;

    let mut ids: HashMap<String, i32> = entities::Permission::find()
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.code, p.id))
        .collect();

    let now = Utc::now().timestamp();
    for item in CATALOG {
        if ids.contains_key(item.code) {
            continue;
        }
        let model = entities::permission::ActiveModel {
            code: Set(item.code.to_string()),
            name: Set(item.name.to_string()),
            description: Set(Some(item.description.to_string())),
            category: Set(item.category.to_string()),
            created_at: Set(now),
            ..Default::default()
        };
        let inserted = entities::Permission::insert(model).exec(&txn).await?;
        ids.insert(item.code.to_string(), inserted.last_insert_id);
        report.permissions_inserted += 1;
    }

    for &(role, role_codes) in DEFAULT_ROLE_GRANTS {
        let existing = entities::RolePermission::find()
            .filter(entities::role_permission::Column::Role.eq(role))
            .count(&txn)
            .await?;
        if existing > 0 {
            continue;
        }

        let rows: Vec<_> = role_codes
            .iter()
            .filter_map(|code| ids.get(*code))
            .map(|id| entities::role_permission::ActiveModel {
                role: Set(role.to_string()),
                permission_id: Set(*id),
                granted: Set(true),
                ..Default::default()
            })
            .collect();
        if rows.is_empty() {
            continue;
        }
        entities::RolePermission::insert_many(rows)
            .exec_without_returning(&txn)
            .await?;
        report.roles_seeded.push(role.to_string());
    }

    txn.commit().await?;

    tracing::info!(
        permissions_inserted = report.permissions_inserted,
        roles_seeded = ?report.roles_seeded,
        "Permission catalog seeded"
    );
    Ok(report)
}

/// Create the configured bootstrap admin unless the username is taken.
/// Returns true when an account was created.
pub async fn ensure_bootstrap_admin(
    db: &DatabaseConnection,
    settings: &Settings,
) -> Result<bool, DeskError> {
    let Some(admin) = settings.auth.bootstrap_admin.as_ref() else {
        return Ok(false);
    };

    if storage::get_user_by_username(db, &admin.username)
        .await?
        .is_some()
    {
        tracing::debug!(username = %admin.username, "Bootstrap admin already exists");
        return Ok(false);
    }

    let user = storage::create_user(
        db,
        NewUser {
            username: admin.username.clone(),
            password: admin.password.clone(),
            email: admin.email.clone(),
            role: ADMIN_ROLE.to_string(),
        },
    )
    .await?;

    tracing::info!(user_id = user.id, username = %user.username, "Created bootstrap admin");
    Ok(true)
}
