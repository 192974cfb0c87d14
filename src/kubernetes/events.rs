// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes Events for operator-visible failures.

use crate::constants::OPERATOR_NAME;
use k8s_openapi::api::core::v1::{Event, EventSource};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::warn;

pub const TYPE_WARNING: &str = "Warning";
pub const TYPE_NORMAL: &str = "Normal";

/// Record an event on `obj`. Failing to record is logged, never propagated.
pub async fn publish_event<K>(client: &Client, obj: &K, event_type: &str, reason: &str, message: &str)
where
    K: Resource<DynamicType = ()>,
{
    // cluster-scoped objects have their events in the default namespace
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let events: Api<Event> = Api::namespaced(client.clone(), &namespace);

    let time = Time(chrono::Utc::now());
    let event = Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}.", obj.name_any())),
            ..Default::default()
        },
        type_: Some(event_type.to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        involved_object: obj.object_ref(&()),
        first_timestamp: Some(time.clone()),
        last_timestamp: Some(time),
        count: Some(1),
        source: Some(EventSource {
            component: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        }),
        reporting_component: Some(OPERATOR_NAME.to_string()),
        ..Default::default()
    };

    if let Err(e) = events.create(&PostParams::default(), &event).await {
        warn!("Failed to record event {} for {}: {}", reason, obj.name_any(), e);
    }
}
