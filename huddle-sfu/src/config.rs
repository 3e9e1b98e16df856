use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;

/// SFU configuration
#[derive(Debug, Clone)]
pub struct SfuConfig {
    /// STUN server URLs announced to the transport
    pub stun_servers: Vec<String>,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun.l.google.com:5349".to_string(),
                "stun:stun1.l.google.com:3478".to_string(),
                "stun:stun1.l.google.com:5349".to_string(),
                "stun:stun2.l.google.com:19302".to_string(),
                "stun:stun2.l.google.com:5349".to_string(),
                "stun:stun3.l.google.com:3478".to_string(),
                "stun:stun3.l.google.com:5349".to_string(),
                "stun:stun4.l.google.com:19302".to_string(),
                "stun:stun4.l.google.com:5349".to_string(),
            ],
        }
    }
}

impl SfuConfig {
    /// Build the transport configuration handed to every peer connection
    #[must_use]
    pub fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.stun_servers.clone(),
                ..Default::default()
            }],
            ice_transport_policy: RTCIceTransportPolicy::All,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_stun() {
        let config = SfuConfig::default();
        let rtc = config.rtc_configuration();
        assert_eq!(rtc.ice_servers.len(), 1);
        assert!(!rtc.ice_servers[0].urls.is_empty());
        assert_eq!(rtc.ice_transport_policy, RTCIceTransportPolicy::All);
    }
}
