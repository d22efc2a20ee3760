use crate::core::error::RetrievalError;
use crate::core::fetcher::QuoteSource;
use crate::providers::gateway::CallbackGateway;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Index of the day percent change in a quote record.
const CHANGE_FIELD: usize = 5;

/// Exchange prefix the quote service expects in front of a listed code.
pub fn market_prefix(code: &str) -> &'static str {
    match code.chars().next() {
        Some('6' | '9') => "sh",
        Some('0' | '3') => "sz",
        Some('4' | '8') => "bj",
        _ => "sz",
    }
}

fn quote_symbol(code: &str) -> String {
    format!("s_{}{}", market_prefix(code), code)
}

/// Batched day-change quotes for listed stocks.
pub struct TencentQuoteProvider {
    gateway: CallbackGateway,
    base_url: String,
}

impl TencentQuoteProvider {
    pub fn new(gateway: CallbackGateway, base_url: &str) -> Self {
        Self {
            gateway,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl QuoteSource for TencentQuoteProvider {
    #[instrument(name = "TencentQuotes", skip(self), fields(count = codes.len()))]
    async fn day_changes(&self, codes: &[String]) -> Result<HashMap<String, f64>, RetrievalError> {
        if codes.is_empty() {
            return Ok(HashMap::new());
        }
        let symbols: Vec<String> = codes.iter().map(|c| quote_symbol(c)).collect();
        let url = format!("{}/q={}", self.base_url, symbols.join(","));
        let script = self.gateway.retrieve(&url).await?;

        let changes: HashMap<String, f64> = codes
            .iter()
            .filter_map(|code| {
                let record = script.global_string(&format!("v_{}", quote_symbol(code)))?;
                let change = record.split('~').nth(CHANGE_FIELD)?.trim().parse::<f64>().ok()?;
                Some((code.clone(), change))
            })
            .collect();
        debug!(priced = changes.len(), "Quotes parsed");
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_market_prefix() {
        assert_eq!(market_prefix("600519"), "sh");
        assert_eq!(market_prefix("900901"), "sh");
        assert_eq!(market_prefix("000858"), "sz");
        assert_eq!(market_prefix("300750"), "sz");
        assert_eq!(market_prefix("430047"), "bj");
        assert_eq!(market_prefix("830799"), "bj");
        assert_eq!(market_prefix("123456"), "sz");
        assert_eq!(market_prefix(""), "sz");
    }

    #[tokio::test]
    async fn test_day_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/q=s_sh600519,s_sz300750,s_bj830799"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "v_s_sh600519=\"1~贵州茅台~600519~1500.00~-10.00~-0.66~12345~67890~~\";\n\
                 v_s_sz300750=\"51~宁德时代~300750~200.00~4.00~2.04~1~2~~\";\n\
                 v_s_bj830799=\"62~艾融软件~830799~30.00~\";\n",
            ))
            .mount(&server)
            .await;

        let provider = TencentQuoteProvider::new(
            CallbackGateway::new(Duration::from_secs(5)).unwrap(),
            &server.uri(),
        );
        let codes = vec!["600519".to_string(), "300750".to_string(), "830799".to_string()];
        let changes = provider.day_changes(&codes).await.unwrap();

        assert_eq!(changes.len(), 2);
        assert_eq!(changes["600519"], -0.66);
        assert_eq!(changes["300750"], 2.04);
        // Record too short to carry a change.
        assert!(!changes.contains_key("830799"));
    }

    #[tokio::test]
    async fn test_day_changes_empty_batch() {
        let provider = TencentQuoteProvider::new(
            CallbackGateway::new(Duration::from_secs(5)).unwrap(),
            "http://127.0.0.1:9",
        );
        assert!(provider.day_changes(&[]).await.unwrap().is_empty());
    }
}
