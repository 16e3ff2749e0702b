#[cfg(test)]
mod tests {
    use crate::config::ApiConfig;
    use crate::http::ContainerOperationsClient;
    use crate::operation::OperationName;
    use crate::retry::RetryConfig;

    #[test]
    fn test_operation_url_joins_endpoint_and_name() {
        let api = ApiConfig {
            endpoint: "http://localhost:9090/v1/".to_string(),
            ..ApiConfig::default()
        };
        let client = ContainerOperationsClient::new(&api, RetryConfig::default()).unwrap();
        let name = OperationName::new("my-project", "us-central1-a", "operation-1").unwrap();

        assert_eq!(client.endpoint(), "http://localhost:9090/v1");
        assert_eq!(
            client.operation_url(&name),
            "http://localhost:9090/v1/projects/my-project/locations/us-central1-a/operations/operation-1"
        );
    }

    #[test]
    fn test_zero_rate_limit_still_builds() {
        let mut api = ApiConfig::default();
        api.rate_limit.requests_per_second = 0;
        api.rate_limit.burst_capacity = 0;

        assert!(ContainerOperationsClient::new(&api, RetryConfig::default()).is_ok());
    }
}
