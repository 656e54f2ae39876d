use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use common::auth::JwtService;
use common::broadcast::BroadcastService;
use common::config::Settings;
use common::db::repositories::PersonRepository;
use common::db::DbPool;
use common::signin::SignInService;
use common::sms::SmsService;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub config: Arc<Settings>,
    pub jwt: JwtService,
    pub metrics: PrometheusHandle,
    pub broadcasts: Arc<BroadcastService>,
    pub sms: Arc<SmsService>,
    pub signin: SignInService,
    pub people: PersonRepository,
}
