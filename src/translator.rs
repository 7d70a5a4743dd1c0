//! Translates alertmanager alert groups into telegram messages.
//!
//! Alerts are received from [alertmanager_webhook_receiver](crate::alertmanager_webhook_receiver)
//! Translated messages are delivered by [telegram](crate::telegram)

use std::{collections::HashMap, fmt};

use serde::Deserialize;

use crate::alert::{AlertGroup, AlertItem};

/// label holding the telegram chat id an alert is routed to
pub const CHAT_ID_LABEL: &str = "label_chat_id";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
/// What happens to cluster, namespace, pod and chat id when an alert of a
/// group doesn't carry them.
pub enum CarryOver {
	/// values of earlier alerts of the same group are reused
	#[default]
	Retain,
	/// every alert is rendered from its own labels only
	Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// telegram chat id of a group chat
pub struct Destination(String);

impl Destination {
	/// Group chat ids are the negated value of the routing label. `"0"` and
	/// empty values don't name a chat.
	pub fn from_label(value: &str) -> Option<Self> {
		let value = value.trim();

		if value.is_empty() || value == "0" {
			return None;
		}

		Some(Self(format!("-{value}")))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Destination {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// rendered alert together with the chat it goes to
pub struct OutboundMessage {
	pub destination: Destination,
	pub text: String,
}

#[derive(Debug, Default, Clone)]
/// fields extracted from the labels of one alert
struct ItemFields {
	cluster: String,
	namespace: String,
	pod: String,
	phase: Option<String>,
	destination: Option<Destination>,
}

impl ItemFields {
	/// Merges the labels of `item` into the fields of the previous alert.
	/// Labels the alert doesn't carry keep their previous value, except for
	/// `phase` which only ever belongs to a single alert.
	fn carried_over(mut self, item: &AlertItem) -> Self {
		let labels = &item.labels;

		if let Some(cluster) = labels.get("cluster") {
			self.cluster = cluster.clone();
		}
		if let Some(namespace) = labels.get("namespace") {
			self.namespace = namespace.clone();
		}
		if let Some(pod) = labels.get("pod") {
			self.pod = pod.clone();
		}
		if let Some(chat_id) = labels.get(CHAT_ID_LABEL) {
			self.destination = Destination::from_label(chat_id);
		}
		self.phase = non_empty(labels, "phase");

		self
	}

	fn from_labels(item: &AlertItem) -> Self {
		Self::default().carried_over(item)
	}

	fn details(&self) -> String {
		let mut details =
			format!("cluster: {}\nnamespace: {}\npod: {}", self.cluster, self.namespace, self.pod);

		if let Some(phase) = &self.phase {
			details.push_str("\nphase: ");
			details.push_str(phase);
		}

		details
	}
}

fn non_empty(labels: &HashMap<String, String>, key: &str) -> Option<String> {
	labels.get(key).filter(|value| !value.is_empty()).cloned()
}

/// Turns alert groups into [OutboundMessage]s, one per routable alert.
#[derive(Debug, Clone, Default)]
pub struct AlertTranslator {
	carry_over: CarryOver,
}

impl AlertTranslator {
	pub fn new(carry_over: CarryOver) -> Self {
		Self { carry_over }
	}

	/// Renders every alert of `group` that has a destination, in order.
	/// Alerts without a chat id are skipped.
	pub fn translate(&self, group: &AlertGroup) -> Vec<OutboundMessage> {
		let mut previous = ItemFields::default();
		let mut messages = Vec::with_capacity(group.alerts.len());

		for item in group.alerts.iter() {
			let fields = match self.carry_over {
				CarryOver::Retain => previous.carried_over(item),
				CarryOver::Reset => ItemFields::from_labels(item),
			};

			if let Some(destination) = fields.destination.clone() {
				let text = format!(
					"{}\n\n{}\nstatus: {}",
					item.annotations.summary,
					fields.details(),
					item.annotations.description
				);

				messages.push(OutboundMessage { destination, text });
			}

			previous = fields;
		}

		messages
	}
}
