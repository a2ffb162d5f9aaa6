#[cfg(test)]
mod tests {
    use crate::error::{panic_response, AppError, AppResult, OptionExt};
    use axum::http::{header, StatusCode};
    use axum::response::{IntoResponse, Response};
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn body_json(res: Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let error = AppError::BadRequest("Invalid input".to_string());
        assert_eq!(format!("{}", error), "Bad request: Invalid input");

        let error = AppError::NotFound("Resource not found".to_string());
        assert_eq!(format!("{}", error), "Not found: Resource not found");

        let error = AppError::RateLimited { retry_after_seconds: 60 };
        assert_eq!(format!("{}", error), "Rate limited. Retry after 60 seconds");

        let error = AppError::Database { message: "Failed to create post".into(), details: None };
        assert_eq!(format!("{}", error), "Database error: Failed to create post");
    }

    #[test]
    fn test_status_and_code_mapping() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (AppError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            (AppError::InvalidInput("x".into()), StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            (
                AppError::Database { message: "x".into(), details: None },
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
            ),
            (AppError::RateLimited { retry_after_seconds: 1 }, StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            (
                AppError::ValidationError { field: "f".into(), message: "m".into() },
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (AppError::Internal(anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];
        for (error, status, code) in cases {
            assert_eq!(error.status(), status);
            assert_eq!(error.code(), code);
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_json_body_shape() {
        let res = AppError::NotFound("Post not found".into()).into_response();
        let body = body_json(res).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["message"], "Post not found");
        assert!(body["error"].get("details").is_none());
        assert_eq!(body["status"], 404);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_database_details_only_when_present() {
        let res = AppError::Database { message: "Failed to fetch post".into(), details: Some("disk I/O error".into()) }
            .into_response();
        let body = body_json(res).await;
        assert_eq!(body["error"]["message"], "Failed to fetch post");
        assert_eq!(body["error"]["details"]["details"], "disk I/O error");

        let res = AppError::Database { message: "Failed to fetch post".into(), details: None }.into_response();
        assert!(body_json(res).await["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let res = AppError::RateLimited { retry_after_seconds: 42 }.into_response();
        assert_eq!(res.headers()[header::RETRY_AFTER], "42");
        assert_eq!(body_json(res).await["error"]["details"]["retry_after_seconds"], 42);
    }

    #[tokio::test]
    async fn test_internal_hides_cause() {
        let res = AppError::Internal(anyhow::anyhow!("secret connection string")).into_response();
        let body = body_json(res).await;
        assert_eq!(body["error"]["message"], "An internal server error occurred");
        assert!(!body.to_string().contains("secret"));
        assert!(body["error"]["details"]["error_id"].is_string());
    }

    #[tokio::test]
    async fn test_panic_response_is_json_500() {
        let res = panic_response(Box::new("handler exploded"));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(res).await["error"]["code"], "INTERNAL_ERROR");
    }

    #[test]
    fn test_option_ext() {
        let result: AppResult<i32> = Some(42).ok_or_not_found("test entity");
        assert_eq!(result.unwrap(), 42);

        let none_value: Option<i32> = None;
        match none_value.ok_or_not_found("test entity").unwrap_err() {
            AppError::NotFound(msg) => assert_eq!(msg, "test entity not found"),
            _ => panic!("Expected NotFound error"),
        }
    }
}
