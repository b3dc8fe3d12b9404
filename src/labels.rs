//! Label dimensions attached to the bytes-transferred counter.

use serde::Serialize;
use tracing::warn;

/// Label value used when a packet has no network layer.
pub const UNKNOWN_IP: &str = "-1.-1.-1.-1";

/// Label value used when a packet has no transport layer or no ports.
pub const UNKNOWN_PORT: &str = "-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Label {
    SourceAddress,
    SourcePort,
    DestinationAddress,
    DestinationPort,
    LinkProtocol,
    NetworkProtocol,
    TransportProtocol,
    ApplicationProtocol,
}

impl Label {
    pub const ALL: [Label; 8] = [
        Label::SourceAddress,
        Label::SourcePort,
        Label::DestinationAddress,
        Label::DestinationPort,
        Label::LinkProtocol,
        Label::NetworkProtocol,
        Label::TransportProtocol,
        Label::ApplicationProtocol,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Label::SourceAddress => "SourceAddress",
            Label::SourcePort => "SourcePort",
            Label::DestinationAddress => "DestinationAddress",
            Label::DestinationPort => "DestinationPort",
            Label::LinkProtocol => "LinkProtocol",
            Label::NetworkProtocol => "NetworkProtocol",
            Label::TransportProtocol => "TransportProtocol",
            Label::ApplicationProtocol => "ApplicationProtocol",
        }
    }

    /// Short code used on the command line, e.g. `sa` for `SourceAddress`.
    pub const fn short_code(&self) -> &'static str {
        match self {
            Label::SourceAddress => "sa",
            Label::SourcePort => "sp",
            Label::DestinationAddress => "da",
            Label::DestinationPort => "dp",
            Label::LinkProtocol => "lp",
            Label::NetworkProtocol => "np",
            Label::TransportProtocol => "tp",
            Label::ApplicationProtocol => "ap",
        }
    }

    /// Accepts either the full label name or its short code.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == name || label.short_code() == name)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sorted, de-duplicated set of labels every worker extracts from every packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Self {
        let mut labels: Vec<Label> = labels.into_iter().collect();
        labels.sort_by_key(|label| label.as_str());
        labels.dedup();
        Self { labels }
    }

    /// Builds a set from configured names. Unknown names are logged and dropped.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels = names.into_iter().filter_map(|name| {
            let name = name.as_ref();
            let label = Label::from_name(name);
            if label.is_none() {
                warn!("got unknown label name: {}", name);
            }
            label
        });
        Self::new(labels)
    }

    pub fn iter(&self) -> impl Iterator<Item = Label> + '_ {
        self.labels.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.labels.iter().map(Label::as_str).collect()
    }

    pub fn contains(&self, label: Label) -> bool {
        self.labels.contains(&label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Values extracted from one packet, in label set order.
pub type LabelValues = Vec<(Label, String)>;
