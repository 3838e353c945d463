use crate::entities;
use crate::errors::DeskError;
use crate::settings::Database as DbCfg;
use base64ct::Encoding;
use chrono::Utc;
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPermission {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// One row of a bulk policy replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEntry {
    pub permission_id: i32,
    pub granted: bool,
}

/// A role default or user override joined with its permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub permission_id: i32,
    pub code: String,
    pub name: String,
    pub category: String,
    pub granted: bool,
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, DeskError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

// User management functions

pub async fn create_user(
    db: &DatabaseConnection,
    input: NewUser,
) -> Result<entities::user::Model, DeskError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    if get_user_by_username(db, &input.username).await?.is_some() {
        return Err(DeskError::Conflict(format!(
            "username `{}` is already taken",
            input.username
        )));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(input.password.as_bytes(), &salt)
        .map_err(|e| DeskError::Other(format!("Password hashing failed: {}", e)))?
        .to_string();

    let user = entities::user::ActiveModel {
        username: Set(input.username),
        password_hash: Set(password_hash),
        email: Set(input.email),
        role: Set(input.role),
        enabled: Set(true),
        created_at: Set(Utc::now().timestamp()),
        ..Default::default()
    };

    Ok(user.insert(db).await?)
}

pub async fn get_user(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Option<entities::user::Model>, DeskError> {
    Ok(entities::User::find_by_id(user_id).one(db).await?)
}

pub async fn get_user_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<entities::user::Model>, DeskError> {
    use entities::user::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Username.eq(username))
        .one(db)
        .await?)
}

/// Returns the user when the password matches and the account is enabled.
pub async fn verify_user_password(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Option<entities::user::Model>, DeskError> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let user = match get_user_by_username(db, username).await? {
        Some(u) if u.enabled => u,
        _ => return Ok(None),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| DeskError::Other(format!("Invalid password hash: {}", e)))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
    {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

pub async fn set_user_enabled(
    db: &DatabaseConnection,
    user_id: i32,
    enabled: bool,
) -> Result<(), DeskError> {
    let user = get_user(db, user_id)
        .await?
        .ok_or_else(|| DeskError::NotFound(format!("user {user_id}")))?;

    let mut active: entities::user::ActiveModel = user.into();
    active.enabled = Set(enabled);
    active.update(db).await?;
    Ok(())
}

// Access token functions

pub async fn issue_access_token(
    db: &DatabaseConnection,
    user_id: i32,
    ttl_secs: i64,
) -> Result<entities::access_token::Model, DeskError> {
    let now = Utc::now().timestamp();

    let access_token = entities::access_token::ActiveModel {
        token: Set(random_token()),
        user_id: Set(user_id),
        created_at: Set(now),
        expires_at: Set(now + ttl_secs),
        revoked: Set(false),
    };

    Ok(access_token.insert(db).await?)
}

/// Token row if it exists, is not revoked and has not expired.
pub async fn get_active_access_token(
    db: &DatabaseConnection,
    token: &str,
) -> Result<Option<entities::access_token::Model>, DeskError> {
    use entities::access_token::{Column, Entity};

    let Some(model) = Entity::find()
        .filter(Column::Token.eq(token))
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    let now = Utc::now().timestamp();
    if model.revoked || now > model.expires_at {
        return Ok(None);
    }
    Ok(Some(model))
}

pub async fn revoke_access_token(db: &DatabaseConnection, token: &str) -> Result<(), DeskError> {
    use entities::access_token::{Column, Entity};

    if let Some(model) = Entity::find()
        .filter(Column::Token.eq(token))
        .one(db)
        .await?
    {
        let mut active: entities::access_token::ActiveModel = model.into();
        active.revoked = Set(true);
        active.update(db).await?;
    }

    Ok(())
}

pub async fn cleanup_expired_access_tokens(db: &DatabaseConnection) -> Result<u64, DeskError> {
    use entities::access_token::{Column, Entity};
    use sea_orm::Condition;

    let now = Utc::now().timestamp();
    let result = Entity::delete_many()
        .filter(
            Condition::any()
                .add(Column::ExpiresAt.lt(now))
                .add(Column::Revoked.eq(true)),
        )
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

// Permission catalog functions

pub async fn list_permissions(
    db: &DatabaseConnection,
    category: Option<&str>,
) -> Result<Vec<entities::permission::Model>, DeskError> {
    use entities::permission::{Column, Entity};

    let mut query = Entity::find();
    if let Some(category) = category {
        query = query.filter(Column::Category.eq(category));
    }

    Ok(query
        .order_by_asc(Column::Category)
        .order_by_asc(Column::Code)
        .all(db)
        .await?)
}

pub async fn get_permission(
    db: &DatabaseConnection,
    id: i32,
) -> Result<Option<entities::permission::Model>, DeskError> {
    Ok(entities::Permission::find_by_id(id).one(db).await?)
}

pub async fn create_permission(
    db: &DatabaseConnection,
    input: NewPermission,
) -> Result<entities::permission::Model, DeskError> {
    use entities::permission::{Column, Entity};

    let code = input.code.trim().to_string();
    let name = input.name.trim().to_string();
    if code.is_empty() || name.is_empty() {
        return Err(DeskError::BadRequest(
            "permission code and name must not be empty".to_string(),
        ));
    }

    if Entity::find()
        .filter(Column::Code.eq(code.as_str()))
        .one(db)
        .await?
        .is_some()
    {
        return Err(DeskError::Conflict(format!(
            "permission code `{code}` already exists"
        )));
    }
    if Entity::find()
        .filter(Column::Name.eq(name.as_str()))
        .one(db)
        .await?
        .is_some()
    {
        return Err(DeskError::Conflict(format!(
            "permission name `{name}` already exists"
        )));
    }

    let permission = entities::permission::ActiveModel {
        code: Set(code.clone()),
        name: Set(name),
        description: Set(input.description),
        category: Set(input.category.trim().to_string()),
        created_at: Set(Utc::now().timestamp()),
        ..Default::default()
    };

    permission.insert(db).await.map_err(|e| {
        if is_unique_violation(&e) {
            DeskError::Conflict(format!("permission code `{code}` already exists"))
        } else {
            e.into()
        }
    })
}

/// Update display fields of a permission. The code is immutable.
pub async fn update_permission(
    db: &DatabaseConnection,
    id: i32,
    update: PermissionUpdate,
) -> Result<entities::permission::Model, DeskError> {
    use entities::permission::{Column, Entity};

    let existing = get_permission(db, id)
        .await?
        .ok_or_else(|| DeskError::NotFound(format!("permission {id}")))?;

    let mut active: entities::permission::ActiveModel = existing.into();

    if let Some(name) = update.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(DeskError::BadRequest(
                "permission name must not be empty".to_string(),
            ));
        }
        if Entity::find()
            .filter(Column::Name.eq(name.as_str()))
            .filter(Column::Id.ne(id))
            .one(db)
            .await?
            .is_some()
        {
            return Err(DeskError::Conflict(format!(
                "permission name `{name}` already exists"
            )));
        }
        active.name = Set(name);
    }
    if let Some(description) = update.description {
        active.description = Set(Some(description));
    }
    if let Some(category) = update.category {
        active.category = Set(category.trim().to_string());
    }

    Ok(active.update(db).await?)
}

/// Delete a permission together with every grant and override that uses it.
pub async fn delete_permission(db: &DatabaseConnection, id: i32) -> Result<(), DeskError> {
    if get_permission(db, id).await?.is_none() {
        return Err(DeskError::NotFound(format!("permission {id}")));
    }

    let txn = db.begin().await?;

    entities::RolePermission::delete_many()
        .filter(entities::role_permission::Column::PermissionId.eq(id))
        .exec(&txn)
        .await?;
    entities::UserPermission::delete_many()
        .filter(entities::user_permission::Column::PermissionId.eq(id))
        .exec(&txn)
        .await?;
    entities::Permission::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;
    Ok(())
}

// Role defaults and user overrides

pub async fn get_role_permissions(
    db: &DatabaseConnection,
    role: &str,
) -> Result<Vec<PermissionGrant>, DeskError> {
    use entities::role_permission::{Column, Entity};

    let rows = Entity::find()
        .filter(Column::Role.eq(role))
        .find_also_related(entities::Permission)
        .order_by_asc(entities::permission::Column::Code)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(row, perm)| perm.map(|p| to_grant(p, row.granted)))
        .collect())
}

pub async fn get_user_permissions(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Vec<PermissionGrant>, DeskError> {
    use entities::user_permission::{Column, Entity};

    let rows = Entity::find()
        .filter(Column::UserId.eq(user_id))
        .find_also_related(entities::Permission)
        .order_by_asc(entities::permission::Column::Code)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(row, perm)| perm.map(|p| to_grant(p, row.granted)))
        .collect())
}

fn to_grant(permission: entities::permission::Model, granted: bool) -> PermissionGrant {
    PermissionGrant {
        permission_id: permission.id,
        code: permission.code,
        name: permission.name,
        category: permission.category,
        granted,
    }
}

/// Reject the whole batch when an id repeats or does not exist.
async fn validate_entries<C: ConnectionTrait>(
    conn: &C,
    entries: &[GrantEntry],
) -> Result<(), DeskError> {
    use entities::permission::{Column, Entity};

    let mut ids = BTreeSet::new();
    for entry in entries {
        if !ids.insert(entry.permission_id) {
            return Err(DeskError::BadRequest(format!(
                "permission {} is listed more than once",
                entry.permission_id
            )));
        }
    }
    if ids.is_empty() {
        return Ok(());
    }

    let found: BTreeSet<i32> = Entity::find()
        .filter(Column::Id.is_in(ids.iter().copied()))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    let missing: Vec<String> = ids
        .difference(&found)
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(DeskError::NotFound(format!(
            "unknown permission id(s): {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Replace every default of `role` with `entries`.
///
/// Runs in one transaction: if anything fails after the delete, the
/// transaction is dropped uncommitted and the previous grants remain.
pub async fn set_role_permissions(
    db: &DatabaseConnection,
    role: &str,
    entries: &[GrantEntry],
) -> Result<(), DeskError> {
    use entities::role_permission::{ActiveModel, Column, Entity};

    let txn = db.begin().await?;
    validate_entries(&txn, entries).await?;

    Entity::delete_many()
        .filter(Column::Role.eq(role))
        .exec(&txn)
        .await?;

    if !entries.is_empty() {
        let rows = entries.iter().map(|e| ActiveModel {
            role: Set(role.to_string()),
            permission_id: Set(e.permission_id),
            granted: Set(e.granted),
            ..Default::default()
        });
        Entity::insert_many(rows).exec_without_returning(&txn).await?;
    }

    txn.commit().await?;
    tracing::info!(role, entries = entries.len(), "Replaced role permissions");
    Ok(())
}

/// Replace every override of `user_id` with `entries`; same guarantees as
/// [`set_role_permissions`].
pub async fn set_user_permissions(
    db: &DatabaseConnection,
    user_id: i32,
    entries: &[GrantEntry],
) -> Result<(), DeskError> {
    use entities::user_permission::{ActiveModel, Column, Entity};

    if get_user(db, user_id).await?.is_none() {
        return Err(DeskError::NotFound(format!("user {user_id}")));
    }

    let txn = db.begin().await?;
    validate_entries(&txn, entries).await?;

    Entity::delete_many()
        .filter(Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;

    if !entries.is_empty() {
        let rows = entries.iter().map(|e| ActiveModel {
            user_id: Set(user_id),
            permission_id: Set(e.permission_id),
            granted: Set(e.granted),
            ..Default::default()
        });
        Entity::insert_many(rows).exec_without_returning(&txn).await?;
    }

    txn.commit().await?;
    tracing::info!(user_id, entries = entries.len(), "Replaced user permission overrides");
    Ok(())
}

// Application settings

pub async fn get_app_settings(db: &DatabaseConnection) -> Result<HashMap<String, Value>, DeskError> {
    let rows = entities::AppSetting::find().all(db).await?;

    let mut settings = HashMap::with_capacity(rows.len());
    for row in rows {
        settings.insert(row.key, serde_json::from_str(&row.value)?);
    }
    Ok(settings)
}

pub async fn set_app_setting(
    db: &DatabaseConnection,
    key: &str,
    value: &Value,
) -> Result<(), DeskError> {
    use entities::app_setting::{Column, Entity};
    use sea_orm::sea_query::OnConflict;

    let setting = entities::app_setting::ActiveModel {
        key: Set(key.to_string()),
        value: Set(serde_json::to_string(value)?),
        updated_at: Set(Utc::now().timestamp()),
    };

    Entity::insert(setting)
        .on_conflict(
            OnConflict::column(Column::Key)
                .update_columns([Column::Value, Column::UpdatedAt])
                .to_owned(),
        )
        .exec(db)
        .await?;

    Ok(())
}
