//! A mail built by the outbound side is picked up intact by the inbound side.

use mailgate::artifact::{Artifact, Route};
use mailgate::config::{InboundConfig, OutboundConfig};
use mailgate::inbound;
use mailgate::mailbox::MemoryMailbox;
use mailgate::outbound::{self, OutboundRequest};

fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |key| {
        pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }
}

const OUTBOUND: &[(&str, &str)] = &[
    ("MAILGATE_TX_USERNAME", "gw"),
    ("MAILGATE_TX_PASSWORD", "secret"),
    ("MAILGATE_TX_TO", "good@example.com"),
    ("MAILGATE_TX_FROM", "gateway@example.com"),
    ("MAILGATE_TX_SUBJECT", "Nightly export [DEMO]"),
];

const INBOUND: &[(&str, &str)] = &[
    ("MAILGATE_RX_USERNAME", "gw"),
    ("MAILGATE_RX_PASSWORD", "secret"),
    ("MAILGATE_RX_TAG", "[DEMO]"),
];

#[test]
fn sent_attachment_is_received_byte_for_byte() {
    let outbound_config = OutboundConfig::from_lookup(lookup(OUTBOUND)).unwrap();
    let inbound_config = InboundConfig::from_lookup(lookup(INBOUND)).unwrap();

    // Every byte value, including CR, LF and NUL, must survive the trip.
    let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let artifact = Artifact::new(content.clone()).with_attribute("filename", "report.pdf");

    // Config validation would refuse "bad-address"; the assembler must still
    // cope with it when a request is built by hand.
    let mut request = OutboundRequest::from_artifact(&outbound_config, &artifact);
    request.recipients = "bad-address, good@example.com".into();
    let (message, report) = outbound::build_message(&request).unwrap();
    assert_eq!(report.delivered_to, vec!["good@example.com"]);
    assert_eq!(report.dropped, vec!["bad-address"]);

    let mut mailbox = MemoryMailbox::new();
    mailbox.push(message.formatted());

    let processed = inbound::route(
        inbound::run_cycle(&mut mailbox, &inbound_config),
        Artifact::default(),
    );

    assert_eq!(processed.route, Route::Success);
    assert_eq!(processed.artifact.filename(), Some("report.pdf"));
    assert_eq!(processed.artifact.content, content);
    assert!(processed.artifact.attributes.contains_key(inbound::SENT_ATTRIBUTE));
    assert!(mailbox.is_empty());
}
