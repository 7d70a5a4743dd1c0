//! prometheus alertmanager receiver that forwards alerts into telegram chats
//!
//! Features:
//! - routes every alert into the chat named by its `label_chat_id` label
//! - renders cluster, namespace, pod and phase of the alert as plain text
//! - prometheus metrics about received alerts and telegram deliveries

pub mod alert;
pub mod alertmanager_webhook_receiver;
pub mod log;
pub mod settings;
pub mod telegram;
pub mod telemetry_endpoint;
pub mod translator;
