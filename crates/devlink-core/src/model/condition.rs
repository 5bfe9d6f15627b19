// ── Tri-state status conditions ──
//
// A DeviceLink's progress is encoded as four ordered conditions. Each one is
// only meaningful once every condition before it is `True`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// The four condition slots, in evaluation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
pub enum ConditionType {
    ModelExisted,
    AdaptorExisted,
    DeviceCreated,
    DeviceConnected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// Machine-readable reasons attached to condition transitions.
pub mod reason {
    pub const CHECKING: &str = "Checking";

    pub const MODEL_FOUND: &str = "ModelFound";
    pub const MODEL_NOT_FOUND: &str = "ModelNotFound";

    pub const ADAPTOR_FOUND: &str = "AdaptorFound";
    pub const ADAPTOR_NOT_FOUND: &str = "AdaptorNotFound";

    pub const DEVICE_CREATED: &str = "DeviceCreated";
    pub const TEMPLATE_INVALID: &str = "TemplateInvalid";
    pub const MODEL_NOT_REGISTERED: &str = "ModelNotRegistered";

    pub const CONNECTED: &str = "Connected";
    pub const CONNECT_FAILED: &str = "ConnectFailed";
    pub const SEND_FAILED: &str = "SendFailed";
    pub const CONNECTION_BROKEN: &str = "ConnectionBroken";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// Ordered set of conditions. Absent slots read as `Unknown`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.condition_type == condition_type)
    }

    pub fn status(&self, condition_type: ConditionType) -> ConditionStatus {
        self.get(condition_type)
            .map_or(ConditionStatus::Unknown, |c| c.status)
    }

    pub fn is_true(&self, condition_type: ConditionType) -> bool {
        self.status(condition_type) == ConditionStatus::True
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Set a condition. The transition time only moves when the status does.
    pub fn set(
        &mut self,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) {
        let now = Utc::now();
        if let Some(existing) = self
            .0
            .iter_mut()
            .find(|c| c.condition_type == condition_type)
        {
            if existing.status != status {
                existing.last_transition_time = Some(now);
            }
            existing.status = status;
            reason.clone_into(&mut existing.reason);
            message.clone_into(&mut existing.message);
            existing.last_update_time = Some(now);
            return;
        }

        let position = self
            .0
            .iter()
            .position(|c| c.condition_type > condition_type)
            .unwrap_or(self.0.len());
        self.0.insert(
            position,
            Condition {
                condition_type,
                status,
                reason: reason.to_owned(),
                message: message.to_owned(),
                last_update_time: Some(now),
                last_transition_time: Some(now),
            },
        );
    }

    pub fn succeed_on(&mut self, condition_type: ConditionType, reason: &str) {
        self.set(condition_type, ConditionStatus::True, reason, "");
    }

    pub fn fail_on(&mut self, condition_type: ConditionType, reason: &str, message: &str) {
        self.set(condition_type, ConditionStatus::False, reason, message);
    }

    /// Reset to `Unknown` so the next pass evaluates the slot again.
    pub fn to_check(&mut self, condition_type: ConditionType) {
        self.set(
            condition_type,
            ConditionStatus::Unknown,
            reason::CHECKING,
            "",
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn absent_condition_reads_unknown() {
        let conditions = Conditions::default();
        assert_eq!(
            conditions.status(ConditionType::DeviceCreated),
            ConditionStatus::Unknown
        );
    }

    #[test]
    fn conditions_stay_in_evaluation_order() {
        let mut conditions = Conditions::default();
        conditions.succeed_on(ConditionType::DeviceConnected, reason::CONNECTED);
        conditions.succeed_on(ConditionType::ModelExisted, reason::MODEL_FOUND);
        conditions.to_check(ConditionType::AdaptorExisted);

        let order: Vec<_> = conditions.iter().map(|c| c.condition_type).collect();
        assert_eq!(
            order,
            vec![
                ConditionType::ModelExisted,
                ConditionType::AdaptorExisted,
                ConditionType::DeviceConnected,
            ]
        );
    }

    #[test]
    fn transition_time_moves_only_on_status_change() {
        let mut conditions = Conditions::default();
        conditions.fail_on(ConditionType::AdaptorExisted, reason::ADAPTOR_NOT_FOUND, "gone");
        let first = conditions
            .get(ConditionType::AdaptorExisted)
            .unwrap()
            .last_transition_time;

        conditions.fail_on(ConditionType::AdaptorExisted, reason::ADAPTOR_NOT_FOUND, "still gone");
        let condition = conditions.get(ConditionType::AdaptorExisted).unwrap();
        assert_eq!(condition.last_transition_time, first);
        assert_eq!(condition.message, "still gone");

        conditions.succeed_on(ConditionType::AdaptorExisted, reason::ADAPTOR_FOUND);
        let condition = conditions.get(ConditionType::AdaptorExisted).unwrap();
        assert_eq!(condition.status, ConditionStatus::True);
        assert!(condition.message.is_empty());
        assert!(condition.last_transition_time >= first);
    }

    #[test]
    fn serializes_with_kubernetes_field_names() {
        let mut conditions = Conditions::default();
        conditions.succeed_on(ConditionType::ModelExisted, reason::MODEL_FOUND);
        let value = serde_json::to_value(&conditions).unwrap();
        assert_eq!(value[0]["type"], "ModelExisted");
        assert_eq!(value[0]["status"], "True");
        assert_eq!(value[0]["reason"], "ModelFound");
    }
}
