//! HTTP media-gateway negotiation: gather-then-POST.
//!
//! The local offer (with candidates already gathered and attached) is POSTed
//! to the gateway's WHEP-style endpoint; the single synchronous response body
//! is applied as the remote answer. No candidate round-trips happen after
//! that point.

use super::error::{MediaError, Result};
use super::peer::PeerTransport;
use crate::http::{HttpClient, HttpRequest};
use log::{debug, info};
use std::sync::Arc;

const SDP_CONTENT_TYPE: &str = "application/sdp";

fn endpoint_url(gateway_url: &str) -> String {
    format!("{}/whep", gateway_url.trim_end_matches('/'))
}

/// Run one full offer → POST → answer exchange against the gateway.
pub async fn negotiate_via_gateway(
    transport: &Arc<dyn PeerTransport>,
    http: &Arc<dyn HttpClient>,
    gateway_url: &str,
) -> Result<()> {
    let offer = transport.create_offer().await?;
    let url = endpoint_url(gateway_url);
    debug!(target: "Media", "POSTing offer ({} bytes) to {url}", offer.len());

    let request = HttpRequest::post(&url)
        .header("Content-Type", SDP_CONTENT_TYPE)
        .body(offer.into_bytes());
    let response = http
        .execute(request)
        .await
        .map_err(|e| MediaError::GatewayUnreachable(e.to_string()))?;

    if !response.is_success() {
        return Err(MediaError::GatewayStatus(response.status_code));
    }

    let answer = String::from_utf8(response.body)
        .map_err(|_| MediaError::MalformedDescription("answer is not valid UTF-8".to_string()))?;
    transport.set_remote_answer(&answer).await?;

    info!(target: "Media", "Gateway negotiation complete via {url}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockHttpClient;
    use crate::media::peer::PeerTransportFactory;
    use crate::media::peer::mock::MockPeerFactory;

    #[tokio::test]
    async fn test_offer_posted_and_answer_applied() {
        let factory = MockPeerFactory::new();
        let (transport, _rx) = factory.create().await.unwrap();
        let mock = factory.wait_transport(0).await;
        let http: Arc<dyn HttpClient> =
            Arc::new(MockHttpClient::respond_with(201, "v=0 gateway-answer"));

        negotiate_via_gateway(&transport, &http, "http://192.168.0.36:8889/stream")
            .await
            .unwrap();

        assert_eq!(
            *mock.remote_answers.lock().await,
            vec!["v=0 gateway-answer".to_string()]
        );
    }

    #[tokio::test]
    async fn test_endpoint_path_and_content_type() {
        let factory = MockPeerFactory::new();
        let (transport, _rx) = factory.create().await.unwrap();
        let http = Arc::new(MockHttpClient::respond_with(200, "v=0 answer"));
        let http_dyn: Arc<dyn HttpClient> = http.clone();

        negotiate_via_gateway(&transport, &http_dyn, "http://gw.local:8889/")
            .await
            .unwrap();

        let requests = http.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "http://gw.local:8889/whep");
        assert_eq!(requests[0].method, "POST");
        assert!(
            requests[0]
                .headers
                .iter()
                .any(|(k, v)| k == "Content-Type" && v == "application/sdp")
        );
    }

    #[tokio::test]
    async fn test_non_2xx_is_negotiation_failure() {
        let factory = MockPeerFactory::new();
        let (transport, _rx) = factory.create().await.unwrap();
        let mock = factory.wait_transport(0).await;
        let http: Arc<dyn HttpClient> = Arc::new(MockHttpClient::respond_with(503, ""));

        let err = negotiate_via_gateway(&transport, &http, "http://gw.local")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::GatewayStatus(503)));
        assert!(mock.remote_answers.lock().await.is_empty());
    }
}
