// SQL query constants for repositories
// Centralizes repeated SELECT column lists

/// SQL query fragments for the person table
pub mod person_queries {
    pub const SELECT_COLUMNS: &str = r#"id, callsign, first_name, last_name, status, email,
        on_site, user_authorized,
        sms_on_playa, sms_off_playa,
        sms_on_playa_verified, sms_off_playa_verified,
        sms_on_playa_stopped, sms_off_playa_stopped,
        sms_on_playa_code, sms_off_playa_code"#;
}

/// SQL query fragments for the position table
pub mod position_queries {
    pub const SELECT_COLUMNS: &str = r#"id, title, active, type, training_position_id, alpha,
        requires_sandman_affidavit, requires_burn_perimeter,
        requires_motor_pool_agreement, counts_as_burn_perimeter"#;
}

/// SQL query fragments for the broadcast tables
pub mod broadcast_queries {
    pub const SELECT_BROADCAST_COLUMNS: &str = r#"id, sender_id, type, alert_id, position_id, slot_id,
        statuses, sender_name, sms_message, email_subject, email_message,
        recipient_count, sms_count, email_count, clubhouse_count,
        sms_failed, email_failed, retry_count, created_at"#;

    pub const SELECT_MESSAGE_COLUMNS: &str = r#"id, broadcast_id, person_id, direction, address_type,
        address, status, message, provider_sid, error, attempts, next_retry_at,
        created_at, updated_at"#;
}
