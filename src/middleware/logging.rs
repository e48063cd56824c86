use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Wraps every request in a tracing span carrying a generated request id, and
/// logs its start and outcome.
pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let span = tracing::info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            method = %req.method(),
            uri = %req.uri(),
        );
        let remote_addr = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        span.in_scope(|| info!(remote_addr = %remote_addr, "Request started"));

        let fut = span.in_scope(|| self.service.call(req));

        Box::pin(
            async move {
                let result = fut.await;
                let duration_ms = start_time.elapsed().as_millis();

                match &result {
                    Ok(response) if response.status().is_server_error() => {
                        warn!(status = %response.status().as_u16(), duration_ms = %duration_ms, "Request completed");
                    }
                    Ok(response) => {
                        info!(status = %response.status().as_u16(), duration_ms = %duration_ms, "Request completed");
                    }
                    Err(err) => {
                        error!(duration_ms = %duration_ms, error = %err, "Request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test as actix_test, web, App, HttpResponse};

    #[actix_web::test]
    async fn test_responses_pass_through() {
        let app = actix_test::init_service(
            App::new()
                .wrap(RequestLogging)
                .route("/ok", web::get().to(|| async { HttpResponse::Ok().body("fine") }))
                .route(
                    "/fail",
                    web::get().to(|| async { HttpResponse::InternalServerError().finish() }),
                ),
        )
        .await;

        let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/ok").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(actix_test::read_body(resp).await, "fine".as_bytes());

        let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/fail").to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/missing").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
