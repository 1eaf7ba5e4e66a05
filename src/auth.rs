//! Transport auth boundary (spec §6, "Transport"). Token issuance and verification are explicitly out of scope;
//! this module only resolves an already-issued credential into a [`ResolvedSession`] the connection manager can
//! register. Two strategies ship: cookie-based (production) and a dev-only query parameter, gated by
//! [`AppConfig::allow_dev_query_auth`].

//local shortcuts
use crate::config::AppConfig;
use crate::ids::{SessionId, UserId};
use crate::model::Role;

//third-party shortcuts
use axum::http::HeaderMap;

//standard shortcuts
use std::collections::HashMap;

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ResolvedSession
{
    pub user_id: UserId,
    pub session_id: SessionId,
    pub role: Role,
    pub is_reconnect: bool,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError
{
    MissingCredential,
    Revoked,
    Banned,
    UserMismatch,
}

//-------------------------------------------------------------------------------------------------------------------

/// Resolves an inbound upgrade request to a session. A real deployment wires this to whatever issues and
/// verifies tokens; that verification step is out of scope here (spec §1) — implementations only need to decode
/// an already-trusted credential into identity.
pub trait SessionResolver: Send + Sync
{
    fn resolve(&self, headers: &HeaderMap, query: &HashMap<String, String>) -> Result<ResolvedSession, AuthError>;
}

//-------------------------------------------------------------------------------------------------------------------

/// Reads the session cookie named by `cookie_name` and looks it up via `lookup`. Production default.
pub struct CookieSessionResolver<F>
where
    F: Fn(&str) -> Option<ResolvedSession> + Send + Sync,
{
    cookie_name: String,
    lookup: F,
}

impl<F> CookieSessionResolver<F>
where
    F: Fn(&str) -> Option<ResolvedSession> + Send + Sync,
{
    pub fn new(cookie_name: impl Into<String>, lookup: F) -> Self
    {
        Self{ cookie_name: cookie_name.into(), lookup }
    }

    fn extract_cookie(&self, headers: &HeaderMap) -> Option<String>
    {
        let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
        raw.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.cookie_name).then(|| value.to_string())
        })
    }
}

impl<F> SessionResolver for CookieSessionResolver<F>
where
    F: Fn(&str) -> Option<ResolvedSession> + Send + Sync,
{
    fn resolve(&self, headers: &HeaderMap, _query: &HashMap<String, String>) -> Result<ResolvedSession, AuthError>
    {
        let token = self.extract_cookie(headers).ok_or(AuthError::MissingCredential)?;
        (self.lookup)(&token).ok_or(AuthError::Revoked)
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Dev-only resolver accepting a `token` query parameter instead of a cookie. Callers must check
/// `AppConfig::allow_dev_query_auth` before wiring this in; it must never be reachable in production (spec §6).
pub struct DevQueryParamResolver<F>
where
    F: Fn(&str) -> Option<ResolvedSession> + Send + Sync,
{
    lookup: F,
}

impl<F> DevQueryParamResolver<F>
where
    F: Fn(&str) -> Option<ResolvedSession> + Send + Sync,
{
    pub fn new(lookup: F) -> Self
    {
        Self{ lookup }
    }
}

impl<F> SessionResolver for DevQueryParamResolver<F>
where
    F: Fn(&str) -> Option<ResolvedSession> + Send + Sync,
{
    fn resolve(&self, _headers: &HeaderMap, query: &HashMap<String, String>) -> Result<ResolvedSession, AuthError>
    {
        let token = query.get("token").ok_or(AuthError::MissingCredential)?;
        (self.lookup)(token).ok_or(AuthError::Revoked)
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Accepts every request as a fixed identity. Used only by integration tests and local demos.
pub struct AllowAllResolver
{
    pub user_id: UserId,
    pub role: Role,
}

impl SessionResolver for AllowAllResolver
{
    fn resolve(&self, _headers: &HeaderMap, _query: &HashMap<String, String>) -> Result<ResolvedSession, AuthError>
    {
        Ok(ResolvedSession{
            user_id: self.user_id.clone(),
            session_id: crate::ids::new_session_id(),
            role: self.role,
            is_reconnect: false,
        })
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Composite resolver trying the cookie strategy first, then the dev query-param strategy when
/// `allow_dev_query_auth` permits it (spec §6).
pub struct DefaultResolver<C, D>
where
    C: SessionResolver,
    D: SessionResolver,
{
    pub cookie: C,
    pub dev_query: D,
    pub allow_dev_query: bool,
}

impl<C, D> SessionResolver for DefaultResolver<C, D>
where
    C: SessionResolver,
    D: SessionResolver,
{
    fn resolve(&self, headers: &HeaderMap, query: &HashMap<String, String>) -> Result<ResolvedSession, AuthError>
    {
        match self.cookie.resolve(headers, query)
        {
            Ok(session) => Ok(session),
            Err(_) if self.allow_dev_query => self.dev_query.resolve(headers, query),
            Err(err) => Err(err),
        }
    }
}

pub fn dev_query_allowed(config: &AppConfig) -> bool
{
    config.allow_dev_query_auth
}

//-------------------------------------------------------------------------------------------------------------------
