// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `oauth.rs`

#[cfg(test)]
mod tests {
    use crate::director::oauth::{OAuthCredentials, OAuthTokenSource};
    use crate::errors::DirectorError;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> OAuthTokenSource {
        OAuthTokenSource::new(
            reqwest::Client::new(),
            OAuthCredentials {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                tokens_endpoint: format!("{}/oauth/token", server.uri()),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_token_is_cached_until_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "abc",
                "token_type": "bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = source(&server);
        assert_eq!(tokens.access_token().await.unwrap(), "abc");
        assert_eq!(tokens.access_token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_nearly_expired_token_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "short-lived",
                "expires_in": 10
            })))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = source(&server);
        tokens.access_token().await.unwrap();
        tokens.access_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = source(&server).access_token().await.unwrap_err();
        assert!(matches!(err, DirectorError::Permanent { .. }));
    }

    #[tokio::test]
    async fn test_unavailable_endpoint_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source(&server).access_token().await.unwrap_err();
        assert!(matches!(err, DirectorError::Transient { .. }));
    }

    #[test]
    fn test_invalid_tokens_endpoint_rejected() {
        let result = OAuthTokenSource::new(
            reqwest::Client::new(),
            OAuthCredentials {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                tokens_endpoint: "not a url".to_string(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials = OAuthCredentials {
            client_id: "client".to_string(),
            client_secret: "hunter2".to_string(),
            tokens_endpoint: "https://oauth.example.com/token".to_string(),
        };
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
