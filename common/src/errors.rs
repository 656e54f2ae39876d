// Error handling framework

use thiserror::Error;

/// Authentication and authorization errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Insufficient permissions: required {0}")]
    InsufficientPermissions(String),
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFieldValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Storage errors (Redis backed counters)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// SMS delivery errors
#[derive(Error, Debug)]
pub enum SmsError {
    #[error("SMS delivery is disabled")]
    Disabled,

    #[error("Invalid phone number: {0}")]
    InvalidNumber(String),

    #[error("SMS request failed: {0}")]
    RequestFailed(String),

    #[error("Twilio error {code}: {message}")]
    Provider { code: i64, message: String },

    #[error("Unexpected Twilio response: {0}")]
    InvalidResponse(String),
}

/// Twilio error codes which will never succeed on retry
pub const TWILIO_UNSUBSCRIBED: i64 = 21610;
const TWILIO_INVALID_NUMBER_CODES: [i64; 3] = [21211, 21214, 21614];

impl SmsError {
    /// Permanent failures are never retried
    pub fn is_permanent(&self) -> bool {
        match self {
            SmsError::InvalidNumber(_) => true,
            SmsError::Provider { code, .. } => {
                *code == TWILIO_UNSUBSCRIBED || TWILIO_INVALID_NUMBER_CODES.contains(code)
            }
            _ => false,
        }
    }

    /// Provider error code, if the failure came from Twilio
    pub fn provider_code(&self) -> Option<i64> {
        match self {
            SmsError::Provider { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Email delivery errors
#[derive(Error, Debug)]
pub enum MailError {
    #[error("Email delivery is disabled")]
    Disabled,

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    BuildFailed(String),

    #[error("SMTP permanent failure: {0}")]
    Rejected(String),

    #[error("SMTP transient failure: {0}")]
    Transport(String),
}

impl MailError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, MailError::InvalidAddress(_) | MailError::Rejected(_))
    }
}

/// Broadcast (RBS) errors
#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("No recipients matched the broadcast criteria")]
    NoRecipients,

    #[error("Broadcast not found: {0}")]
    NotFound(i64),

    #[error("Failed to export broadcast log: {0}")]
    Export(String),
}

/// SMS verification and inbound handling errors
#[derive(Error, Debug)]
pub enum SmsServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sms(#[from] SmsError),

    #[error("Person not found: {0}")]
    PersonNotFound(i64),

    #[error("Too many verification codes requested, try again later")]
    RateLimited,

    #[error("Verification code does not match")]
    CodeMismatch,
}

/// Shift sign-in errors
#[derive(Error, Debug)]
pub enum SignInError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Person not found: {0}")]
    PersonNotFound(i64),

    #[error("Position not found: {0}")]
    PositionNotFound(i64),

    #[error("Timesheet not found: {0}")]
    TimesheetNotFound(i64),

    #[error("Sign in blocked: {}", .0.join(", "))]
    Blocked(Vec<String>),

    #[error("Timesheet {0} is already signed out")]
    AlreadySignedOut(i64),
}

/// API response error type for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let code = match err {
            AuthError::InvalidToken(_) | AuthError::TokenExpired => "unauthorized",
            AuthError::InsufficientPermissions(_) => "forbidden",
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::new("validation_error", err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(_) => ApiError::new("not_found", err.to_string()),
            DatabaseError::DuplicateKey(_) => ApiError::new("conflict", err.to_string()),
            _ => ApiError::new("database_error", err.to_string()),
        }
    }
}

impl From<BroadcastError> for ApiError {
    fn from(err: BroadcastError) -> Self {
        match err {
            BroadcastError::Validation(e) => e.into(),
            BroadcastError::Auth(e) => e.into(),
            BroadcastError::Database(e) => e.into(),
            BroadcastError::NoRecipients => ApiError::new("no_recipients", err.to_string()),
            BroadcastError::NotFound(_) => ApiError::new("not_found", err.to_string()),
            BroadcastError::Export(_) => ApiError::new("internal_error", err.to_string()),
        }
    }
}

impl From<SmsServiceError> for ApiError {
    fn from(err: SmsServiceError) -> Self {
        match err {
            SmsServiceError::Validation(e) => e.into(),
            SmsServiceError::Database(e) => e.into(),
            SmsServiceError::PersonNotFound(_) => ApiError::new("not_found", err.to_string()),
            SmsServiceError::RateLimited => ApiError::new("rate_limit_exceeded", err.to_string()),
            SmsServiceError::CodeMismatch => ApiError::new("validation_error", err.to_string()),
            SmsServiceError::Sms(_) => ApiError::new("sms_error", err.to_string()),
            SmsServiceError::Storage(_) => ApiError::new("internal_error", err.to_string()),
        }
    }
}

impl From<SignInError> for ApiError {
    fn from(err: SignInError) -> Self {
        match err {
            SignInError::Database(e) => e.into(),
            SignInError::Auth(e) => e.into(),
            SignInError::PersonNotFound(_)
            | SignInError::PositionNotFound(_)
            | SignInError::TimesheetNotFound(_) => ApiError::new("not_found", err.to_string()),
            SignInError::Blocked(ref reasons) => {
                let details = serde_json::json!({ "blockers": reasons });
                ApiError::new("signin_blocked", err.to_string()).with_details(details)
            }
            SignInError::AlreadySignedOut(_) => ApiError::new("conflict", err.to_string()),
        }
    }
}

// Implement From for common external errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        "23503" => DatabaseError::ForeignKeyViolation(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(err.to_string())
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::RedisError(err.to_string())
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::InvalidJson(err.to_string())
    }
}
