use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{self, HeaderMap},
    web, Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use tracing::warn;

use crate::auth::{AccessGate, Claims};
use crate::errors::LedgerServiceError;
use crate::metrics;

/// Verifies the bearer token on every request of the wrapped scope and
/// stores the resulting [`Claims`] in request extensions. Identity and role
/// checks are left to the handlers via [`AccessGate::resolve`].
pub struct JwtAuth;

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct JwtAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let claims = match authenticate_request(&req) {
            Ok(claims) => claims,
            Err(err) => return Box::pin(async move { Err(err.into()) }),
        };

        // Handlers pick this up through web::ReqData<Claims>
        req.extensions_mut().insert(claims);

        let fut = self.service.call(req);
        Box::pin(async move { fut.await })
    }
}

fn authenticate_request(req: &ServiceRequest) -> crate::errors::Result<Claims> {
    let gate = req
        .app_data::<web::Data<AccessGate>>()
        .ok_or_else(|| LedgerServiceError::Internal("access gate is not configured".to_string()))?;

    let token = bearer_token(req.headers()).ok_or_else(|| {
        warn!(path = %req.path(), reason = "missing_token", "Bearer token rejected");
        metrics::AUTH_FAILURES
            .with_label_values(&["missing_token"])
            .inc();
        LedgerServiceError::Unauthenticated
    })?;

    gate.authenticate(token)
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenIssuer;
    use crate::models::Role;
    use crate::store::MemoryStore;
    use actix_web::{http::header::HeaderValue, http::StatusCode, test, App, HttpResponse};
    use chrono::Duration;
    use std::sync::Arc;

    async fn whoami(claims: web::ReqData<Claims>) -> HttpResponse {
        HttpResponse::Ok().body(claims.sub.clone())
    }

    #[::core::prelude::v1::test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[actix_web::test]
    async fn test_scope_requires_valid_bearer_token() {
        let issuer = Arc::new(TokenIssuer::new(
            "middleware-test-secret-key-0000000001",
            Duration::days(7),
        ));
        let gate = Arc::new(AccessGate::new(Arc::new(MemoryStore::new()), issuer.clone()));
        let app = test::init_service(
            App::new().app_data(web::Data::from(gate)).service(
                web::scope("/private")
                    .wrap(JwtAuth)
                    .route("/whoami", web::get().to(whoami)),
            ),
        )
        .await;

        let status_of = |res: std::result::Result<ServiceResponse, Error>| match res {
            Ok(resp) => resp.status(),
            Err(err) => err.as_response_error().status_code(),
        };

        let req = test::TestRequest::get().uri("/private/whoami").to_request();
        assert_eq!(status_of(test::try_call_service(&app, req).await), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/private/whoami")
            .insert_header((header::AUTHORIZATION, "Bearer not.a.token"))
            .to_request();
        assert_eq!(status_of(test::try_call_service(&app, req).await), StatusCode::UNAUTHORIZED);

        let token = issuer.issue("ali", Role::Collector).unwrap();
        let req = test::TestRequest::get()
            .uri("/private/whoami")
            .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "ali");
    }
}
