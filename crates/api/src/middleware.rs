//! Client-IP extraction and admin-key authentication, grounded on the
//! teacher-sibling repo's `server::middleware::{ip_extractor, jwt_auth}`
//! (`examples/fourthplaces-mntogether/packages/server/src/server/middleware/`):
//! same "populate a request extension, let handlers opt in" shape, swapping
//! JWT verification for a single shared-secret comparison since the
//! session/auth subsystem is out of scope here (spec.md §1).

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

/// `ConnectInfo` is only present when the app is served through
/// `into_make_service_with_connect_info` — absent under `oneshot`-style
/// tests, so it's optional rather than a hard extractor failure.
pub async fn extract_client_ip(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let ip = if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        forwarded
            .to_str()
            .ok()
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    } else if let Some(real_ip) = request.headers().get("x-real-ip") {
        real_ip.to_str().ok().and_then(|s| s.parse::<IpAddr>().ok())
    } else {
        connect_info.map(|ConnectInfo(addr)| addr.ip())
    };

    if let Some(ip) = ip {
        request.extensions_mut().insert(ClientIp(ip));
    }

    next.run(request).await
}

/// Authenticated operator identity, inserted into request extensions once
/// `require_admin_key` accepts the request. Handlers that append an audit
/// entry pull `actor_id` from here.
#[derive(Clone, Debug)]
pub struct AdminPrincipal {
    pub actor_id: String,
}

fn bearer_token(request: &Request) -> Option<&str> {
    let header = request.headers().get(axum::http::header::AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

/// Rejects with 401 when no token is presented and 403 when it doesn't
/// match the configured admin key — the two failure codes every endpoint
/// in spec.md §6's table reserves for auth.
pub async fn require_admin_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(ApiError::Unauthenticated)?;
    if token != state.admin_api_key.as_ref() {
        return Err(ApiError::Forbidden);
    }

    request.extensions_mut().insert(AdminPrincipal { actor_id: "admin".to_string() });
    Ok(next.run(request).await)
}
