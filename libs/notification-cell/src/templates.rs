use std::collections::HashMap;

use crate::error::NotificationError;
use crate::models::NotificationContext;

/// Template keys the appointment workflow dispatches.
pub mod keys {
    pub const APPOINTMENT_CREATED: &str = "appointment_created";
    pub const APPOINTMENT_CONFIRMED: &str = "appointment_confirmed";
    pub const APPOINTMENT_CANCELLED: &str = "appointment_cancelled";
    pub const APPOINTMENT_COMPLETED: &str = "appointment_completed";
    pub const APPOINTMENT_NO_SHOW: &str = "appointment_no_show";
    pub const APPOINTMENT_RESCHEDULED_FROM: &str = "appointment_rescheduled_from";
    pub const APPOINTMENT_RESCHEDULED_TO: &str = "appointment_rescheduled_to";
}

#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    templates: HashMap<String, String>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer preloaded with a body for every key in [`keys`].
    pub fn with_defaults() -> Self {
        let mut renderer = Self::new();
        renderer.register(
            keys::APPOINTMENT_CREATED,
            "Appointment :appointment_id on :scheduled_at (:duration_minutes min) was requested and awaits confirmation.",
        );
        renderer.register(
            keys::APPOINTMENT_CONFIRMED,
            "Your appointment on :scheduled_at is confirmed.",
        );
        renderer.register(
            keys::APPOINTMENT_CANCELLED,
            "Your appointment on :scheduled_at was cancelled. Reason: :reason",
        );
        renderer.register(
            keys::APPOINTMENT_COMPLETED,
            "Your appointment on :scheduled_at is complete.",
        );
        renderer.register(
            keys::APPOINTMENT_NO_SHOW,
            "The appointment on :scheduled_at was marked as missed.",
        );
        renderer.register(
            keys::APPOINTMENT_RESCHEDULED_FROM,
            "Your appointment on :previous_scheduled_at no longer takes place at that time.",
        );
        renderer.register(
            keys::APPOINTMENT_RESCHEDULED_TO,
            "Your appointment is now on :scheduled_at (:duration_minutes min) and awaits confirmation.",
        );
        renderer
    }

    pub fn register(&mut self, key: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(key.into(), body.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    pub fn render(&self, key: &str, context: &NotificationContext) -> Result<String, NotificationError> {
        let template = self
            .templates
            .get(key)
            .ok_or_else(|| NotificationError::UnknownTemplate(key.to_string()))?;
        Ok(interpolate(template, context))
    }
}

/// Replaces `:key` tokens with their context value in a single pass. Longer
/// keys win over their prefixes and tokens without a context entry are left
/// as written.
pub fn interpolate(template: &str, context: &NotificationContext) -> String {
    let mut keys: Vec<&String> = context.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(':') {
        rendered.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let matched = keys.iter().find(|key| {
            after.starts_with(key.as_str())
                && !after[key.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        });

        match matched {
            Some(key) => {
                rendered.push_str(&context[key.as_str()]);
                rest = &after[key.len()..];
            }
            None => {
                rendered.push(':');
                rest = after;
            }
        }
    }

    rendered.push_str(rest);
    rendered
}
