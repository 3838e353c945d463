pub mod access_token;
pub mod app_setting;
pub mod permission;
pub mod role_permission;
pub mod user;
pub mod user_permission;

pub use access_token::Entity as AccessToken;
pub use app_setting::Entity as AppSetting;
pub use permission::Entity as Permission;
pub use role_permission::Entity as RolePermission;
pub use user::Entity as User;
pub use user_permission::Entity as UserPermission;
