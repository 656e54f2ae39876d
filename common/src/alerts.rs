// Per-person alert preferences

use crate::errors::ValidationError;
use crate::models::{AlertKind, AlertPreference};
use serde::{Deserialize, Serialize};

/// One row of a person's preference sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertSetting {
    pub alert_id: i64,
    pub alert: AlertKind,
    pub title: &'static str,
    pub on_playa: bool,
    pub mandatory: bool,
    pub use_sms: bool,
    pub use_email: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertSettingUpdate {
    pub alert_id: i64,
    pub use_sms: bool,
    pub use_email: bool,
}

/// Every alert kind for a person; kinds without a stored row are opted in
pub fn alert_settings(stored: &[AlertPreference]) -> Vec<AlertSetting> {
    AlertKind::ALL
        .iter()
        .map(|kind| {
            let pref = stored.iter().find(|p| p.alert_id == kind.id());
            AlertSetting {
                alert_id: kind.id(),
                alert: *kind,
                title: kind.title(),
                on_playa: kind.on_playa(),
                mandatory: kind.mandatory(),
                use_sms: pref.map_or(true, |p| p.use_sms),
                use_email: pref.map_or(true, |p| p.use_email),
            }
        })
        .collect()
}

/// Check an update against the alert table and turn it into a row to store
pub fn preference_from_update(
    person_id: i64,
    update: &AlertSettingUpdate,
) -> Result<AlertPreference, ValidationError> {
    let kind = AlertKind::from_id(update.alert_id).ok_or_else(|| {
        ValidationError::invalid("alert_id", format!("unknown alert {}", update.alert_id))
    })?;

    if kind.mandatory() && !(update.use_sms && update.use_email) {
        return Err(ValidationError::invalid(
            "alert_id",
            format!("{} cannot be turned off", kind.title()),
        ));
    }

    Ok(AlertPreference {
        person_id,
        alert_id: kind.id(),
        use_sms: update.use_sms,
        use_email: update.use_email,
    })
}
