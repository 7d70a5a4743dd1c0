//! data structures for deserializing incoming alerts
//!
//! `null` is accepted wherever a value is expected and read as the empty value,
//! alertmanager webhooks relayed through other tools sometimes contain them.
use std::collections::HashMap;

use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull};

/// label map where `null` values and a `null` map are both read as empty
type Labels = DefaultOnNull<HashMap<serde_with::Same, DefaultOnNull>>;

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
/// data from prometheus received by the alertmanager webhook receiver
#[allow(clippy::missing_docs_in_private_items)]
pub struct AlertGroup {
	#[serde_as(as = "DefaultOnNull")]
	pub version: String,
	#[serde_as(as = "DefaultOnNull")]
	pub group_key: String,

	#[serde_as(as = "DefaultOnNull")]
	pub receiver: String,
	#[serde_as(as = "DefaultOnNull")]
	pub status: String,
	#[serde_as(as = "DefaultOnNull<Vec<DefaultOnNull>>")]
	pub alerts: Vec<AlertItem>,
	#[serde_as(as = "Labels")]
	pub group_labels: HashMap<String, String>,
	#[serde_as(as = "Labels")]
	pub common_labels: HashMap<String, String>,
	#[serde_as(as = "Labels")]
	pub common_annotations: HashMap<String, String>,
	#[serde(rename = "externalURL")]
	#[serde_as(as = "DefaultOnNull")]
	pub external_url: String,
}

impl AlertGroup {
	/// Decodes the first json value of a request body. Bytes after the first
	/// value are ignored, alertmanager never sends any. A `null` body is an
	/// empty group.
	pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
		let mut stream = serde_json::Deserializer::from_slice(body).into_iter::<Option<Self>>();

		match stream.next() {
			Some(group) => group.map(Option::unwrap_or_default),
			None => Err(serde::de::Error::custom("empty request body")),
		}
	}

	/// `alertname` shared by all alerts of the group, empty if unset
	pub fn alert_name(&self) -> &str {
		self.common_labels.get("alertname").map(String::as_str).unwrap_or_default()
	}
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
/// a single alert of an [AlertGroup]
pub struct AlertItem {
	#[serde_as(as = "Labels")]
	pub labels: HashMap<String, String>,
	#[serde_as(as = "DefaultOnNull")]
	pub annotations: Annotations,
	pub starts_at: Option<String>,
	#[serde(alias = "EndsAt")]
	pub ends_at: Option<String>,
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
/// the annotations we render, everything else is dropped
pub struct Annotations {
	#[serde_as(as = "DefaultOnNull")]
	pub summary: String,
	#[serde_as(as = "DefaultOnNull")]
	pub description: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	const PAYLOAD: &str = r#"{
		"version": "4",
		"groupKey": "{}:{alertname=\"PodNotReady\"}",
		"status": "firing",
		"receiver": "telegram",
		"groupLabels": {"alertname": "PodNotReady"},
		"commonLabels": {"alertname": "PodNotReady", "severity": "critical"},
		"commonAnnotations": {},
		"externalURL": "http://alertmanager:9093",
		"truncatedAlerts": 0,
		"alerts": [
			{
				"status": "firing",
				"labels": {"cluster": "c1", "label_chat_id": "42"},
				"annotations": {"summary": "Pod down", "description": "CrashLoop", "runbook_url": "x"},
				"startsAt": "2022-05-01T10:00:00Z",
				"EndsAt": "0001-01-01T00:00:00Z",
				"generatorURL": "http://prometheus"
			}
		]
	}"#;

	#[test]
	fn decodes_alertmanager_payload() {
		let group = AlertGroup::decode(PAYLOAD.as_bytes()).unwrap();

		assert_eq!(group.status, "firing");
		assert_eq!(group.receiver, "telegram");
		assert_eq!(group.external_url, "http://alertmanager:9093");
		assert_eq!(group.alert_name(), "PodNotReady");
		assert_eq!(group.alerts.len(), 1);

		let item = &group.alerts[0];
		assert_eq!(item.labels["label_chat_id"], "42");
		assert_eq!(item.annotations.summary, "Pod down");
		assert_eq!(item.annotations.description, "CrashLoop");
		assert_eq!(item.starts_at.as_deref(), Some("2022-05-01T10:00:00Z"));
		assert_eq!(item.ends_at.as_deref(), Some("0001-01-01T00:00:00Z"));
	}

	#[test]
	fn missing_fields_default_to_empty() {
		let group = AlertGroup::decode(br#"{"alerts": [{}]}"#).unwrap();

		assert_eq!(group.status, "");
		assert_eq!(group.alert_name(), "");
		assert!(group.alerts[0].labels.is_empty());
		assert_eq!(group.alerts[0].annotations, Annotations::default());
		assert_eq!(group.alerts[0].ends_at, None);
	}

	#[test]
	fn null_fields_read_as_empty() {
		let group = AlertGroup::decode(
			br#"{
				"status": null,
				"commonLabels": null,
				"commonAnnotations": null,
				"alerts": [
					{
						"labels": {"label_chat_id": "1", "pod": null},
						"annotations": {"summary": null, "description": "d"},
						"startsAt": null
					},
					{"labels": null, "annotations": null},
					null
				]
			}"#,
		)
		.unwrap();

		assert_eq!(group.status, "");
		assert!(group.common_labels.is_empty());
		assert!(group.common_annotations.is_empty());
		assert_eq!(group.alerts.len(), 3);

		let first = &group.alerts[0];
		assert_eq!(first.labels["label_chat_id"], "1");
		assert_eq!(first.labels["pod"], "");
		assert_eq!(first.annotations.summary, "");
		assert_eq!(first.annotations.description, "d");
		assert_eq!(first.starts_at, None);

		assert_eq!(group.alerts[1], AlertItem::default());
		assert_eq!(group.alerts[2], AlertItem::default());
	}

	#[test]
	fn null_body_is_an_empty_group() {
		assert_eq!(AlertGroup::decode(b"null").unwrap(), AlertGroup::default());
	}

	#[test]
	fn trailing_bytes_are_ignored() {
		let group = AlertGroup::decode(br#"{"status": "resolved"} trailing"#).unwrap();
		assert_eq!(group.status, "resolved");
	}

	#[test]
	fn rejects_invalid_bodies() {
		assert!(AlertGroup::decode(b"").is_err());
		assert!(AlertGroup::decode(b"not json").is_err());
		assert!(AlertGroup::decode(br#"{"alerts": "nope"}"#).is_err());
	}
}
