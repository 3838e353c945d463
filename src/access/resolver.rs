use std::collections::BTreeMap;
use std::sync::Arc;

use crate::access::store::PolicyStore;
use crate::access::{Decision, Principal};
use crate::errors::DeskError;

/// Single entry point for permission decisions, shared by the route guard
/// and handlers through `AppState`.
#[derive(Clone)]
pub struct AccessResolver {
    store: Arc<dyn PolicyStore>,
}

impl AccessResolver {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Decide whether `principal` holds `code`.
    ///
    /// Admin bypass, then the user's override, then the role default, then
    /// deny. A store error is returned as-is and never treated as a grant.
    pub async fn check_permission(
        &self,
        principal: &Principal,
        code: &str,
    ) -> Result<Decision, DeskError> {
        if principal.is_admin() {
            return Ok(Decision::Allow);
        }

        if let Some(granted) = self.store.user_override(principal.user_id, code).await? {
            return Ok(granted.into());
        }

        if let Some(granted) = self.store.role_grant(&principal.role, code).await? {
            return Ok(granted.into());
        }

        Ok(Decision::Deny)
    }

    /// Allow when any override or role default on any of `codes` is granted.
    ///
    /// Unlike [`check_permission`](Self::check_permission) this does not let a
    /// denying override shadow a granting role default for the same code: the
    /// rows of both layers are pooled and reduced with "any granted". This
    /// matches how the CRM routes have always behaved.
    pub async fn check_any_permission(
        &self,
        principal: &Principal,
        codes: &[String],
    ) -> Result<Decision, DeskError> {
        if principal.is_admin() {
            return Ok(Decision::Allow);
        }

        let overrides = self
            .store
            .user_overrides_for_codes(principal.user_id, codes)
            .await?;
        let defaults = self
            .store
            .role_grants_for_codes(&principal.role, codes)
            .await?;

        Ok(overrides.iter().chain(defaults.iter()).any(|g| *g).into())
    }

    /// Resolved `code -> granted` map for UI hydration.
    ///
    /// Codes with neither a role default nor an override are left out and
    /// must be read as denied. Mutating routes are still guarded by
    /// [`check_permission`](Self::check_permission).
    pub async fn effective_permissions(
        &self,
        user_id: i32,
        role: &str,
    ) -> Result<BTreeMap<String, bool>, DeskError> {
        if role == crate::access::ADMIN_ROLE {
            let codes = self.store.permission_codes().await?;
            return Ok(codes.into_iter().map(|c| (c, true)).collect());
        }

        let mut effective: BTreeMap<String, bool> =
            self.store.role_grants(role).await?.into_iter().collect();

        for (code, granted) in self.store.user_overrides(user_id).await? {
            effective.insert(code, granted);
        }

        Ok(effective)
    }
}
