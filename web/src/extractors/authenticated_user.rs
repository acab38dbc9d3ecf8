use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::HeaderName, request::Parts, HeaderMap, StatusCode},
};
use events::{Actor, Role};
use log::*;

/// Identity of the caller, set by the gateway after it validated credentials.
pub(crate) const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
pub(crate) const USER_ROLE_HEADER: HeaderName = HeaderName::from_static("x-user-role");

pub(crate) struct AuthenticatedUser(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(AuthenticatedUser)
    }
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, RejectionType> {
    let unauthorized = || (StatusCode::UNAUTHORIZED, "Unauthorized".to_string());

    let id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(unauthorized)?;

    let role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(unauthorized)?;

    let role = role.parse::<Role>().map_err(|_| {
        warn!("Rejecting request from {id} with unknown role {role}");
        unauthorized()
    })?;

    trace!("Authenticated {role} {id}");
    Ok(Actor::new(id, role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(id: Option<&'static str>, role: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(id) = id {
            headers.insert(USER_ID_HEADER, HeaderValue::from_static(id));
        }
        if let Some(role) = role {
            headers.insert(USER_ROLE_HEADER, HeaderValue::from_static(role));
        }
        headers
    }

    #[test]
    fn test_actor_from_gateway_headers() {
        let actor = actor_from_headers(&headers(Some("d1"), Some("driver"))).unwrap();
        assert_eq!(actor, Actor::new("d1", Role::Driver));
    }

    #[test]
    fn test_missing_or_unknown_identity_is_unauthorized() {
        for (id, role) in [
            (None, Some("customer")),
            (Some("c1"), None),
            (Some(" "), Some("customer")),
            (Some("c1"), Some("admin")),
        ] {
            let (status, _) = actor_from_headers(&headers(id, role)).unwrap_err();
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }
}
