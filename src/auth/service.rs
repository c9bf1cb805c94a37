//! 认证服务：登录、登出、权限刷新

use std::sync::Arc;
use tracing::{info, warn};

use super::profile_store::ProfileStore;
use super::session_store::SessionStore;
use crate::api::{ApiClient, Method};
use crate::error::Result;
use crate::models::auth::{LoginRequest, LoginResponse};
use crate::models::permission::PermissionsPayload;
use crate::query::QueryCache;

const LOGIN_PATH: &str = "auth/login";
const LOGOUT_PATH: &str = "auth/logout";
const PERMISSIONS_PATH: &str = "auth/my-permissions";

pub struct AuthService {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    profile: Arc<ProfileStore>,
    cache: Arc<QueryCache>,
}

impl AuthService {
    pub fn new(
        api: Arc<ApiClient>,
        session: Arc<SessionStore>,
        profile: Arc<ProfileStore>,
        cache: Arc<QueryCache>,
    ) -> Self {
        Self {
            api,
            session,
            profile,
            cache,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn profile(&self) -> &ProfileStore {
        &self.profile
    }

    /// 用户登录
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse> {
        let response: LoginResponse = self.api.post(LOGIN_PATH, &req).await?;

        self.session.login(
            response.token.clone(),
            response.is_admin,
            response.permissions.clone(),
        )?;
        self.profile.set_profile_id(response.user.id)?;

        info!(user_id = response.user.id, "User signed in");
        Ok(response)
    }

    /// 用户登出
    ///
    /// 服务端登出失败不影响本地清理。
    pub async fn logout(&self) -> Result<()> {
        if self.session.is_authorized() {
            if let Err(e) = self.api.send(Method::Post, LOGOUT_PATH, None, None).await {
                warn!(error = %e, "Server-side logout failed, clearing local session anyway");
            }
        }

        self.cache.clear();
        self.profile.clear()?;
        self.session.logout()
    }

    /// 重新获取当前用户权限，不修改令牌
    pub async fn refresh_permissions(&self) -> Result<()> {
        let payload: PermissionsPayload = self.api.get(PERMISSIONS_PATH, None).await?;

        if !self.session.is_authorized() {
            // 请求期间已登出
            return Ok(());
        }

        self.session.set_permissions(payload.permissions)?;
        if let Some(is_admin) = payload.is_admin {
            self.session.set_admin(is_admin)?;
        }
        info!("Permissions refreshed");
        Ok(())
    }
}
