//! Per-IP request budgets built on governor and `tower_governor`.
//!
//! Every tier holds its own limiter. `max` requests replenish evenly over the
//! tier window with a burst of `max`, so a quiet client gets the full budget
//! at once. The auth tier only spends budget on requests that fail, so a user
//! who logs in successfully is never locked out by their own traffic.
//! Rejections are re-rendered as the JSON error clients expect and recorded in
//! the security log.

use std::{
    collections::{BTreeMap, HashMap},
    net::{IpAddr, Ipv4Addr},
    num::NonZeroU32,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{self, HeaderName, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use governor::{
    Quota, RateLimiter,
    clock::{DefaultClock, QuantaInstant},
    middleware::{NoOpMiddleware, StateInformationMiddleware},
    state::keyed::DefaultKeyedStateStore,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tower_governor::{
    GovernorError, GovernorLayer,
    governor::{GovernorConfig, GovernorConfigBuilder},
    key_extractor::KeyExtractor,
};

use crate::{
    config::{RateLimitConfig, RateLimitTier},
    middleware::client::{client_ip, request_info},
    security_log::{SecurityEvent, SecurityLogger},
};

/// Keys limiters by the socket peer, or by the forwarded client address when
/// the deployment trusts its proxy. Requests with no resolvable address share
/// the unspecified-address bucket instead of failing.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor {
    pub trust_proxy: bool,
}

impl ClientIpKeyExtractor {
    fn key_for<T>(&self, req: &http::Request<T>) -> IpAddr {
        client_ip(req.headers(), req.extensions(), self.trust_proxy)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &http::Request<T>) -> Result<Self::Key, GovernorError> {
        Ok(self.key_for(req))
    }
}

pub type TierConfig = GovernorConfig<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>>;

pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, Body>;

type FailureLimiter =
    RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock, StateInformationMiddleware>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateTier {
    General,
    Auth,
    Payment,
    PasswordReset,
    Registration,
    Api,
}

impl RateTier {
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::Payment => "payment",
            Self::PasswordReset => "password_reset",
            Self::Registration => "registration",
            Self::Api => "api",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::General => "Too many requests from this IP, please try again later.",
            Self::Auth => "Too many authentication attempts, please try again later.",
            Self::Payment => "Too many payment attempts, please try again later.",
            Self::PasswordReset => "Too many password reset attempts, please try again later.",
            Self::Registration => "Too many registration attempts, please try again later.",
            Self::Api => "Too many API requests, please slow down.",
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            Self::General | Self::Api => "requests",
            _ => "attempts",
        }
    }

    /// Successful responses do not spend this tier's budget.
    pub fn skips_successful_requests(&self) -> bool {
        matches!(self, Self::Auth)
    }
}

#[derive(Clone)]
enum Budget {
    EveryRequest(Arc<TierConfig>),
    FailedRequests(Arc<FailureBudget>),
}

#[derive(Clone)]
pub struct TierLimiter {
    tier: RateTier,
    limit: RateLimitTier,
    keys: ClientIpKeyExtractor,
    budget: Budget,
}

impl TierLimiter {
    pub fn new(tier: RateTier, limit: RateLimitTier, trust_proxy: bool) -> anyhow::Result<Self> {
        let invalid = || anyhow::anyhow!("invalid {} rate limit configuration", tier.name());
        let burst = limit.max.max(1);
        let period = (limit.window / burst).max(Duration::from_millis(1));
        let keys = ClientIpKeyExtractor { trust_proxy };

        let budget = if tier.skips_successful_requests() {
            let burst = NonZeroU32::new(burst).ok_or_else(invalid)?;
            let budget = FailureBudget::new(keys, period, burst).ok_or_else(invalid)?;
            Budget::FailedRequests(Arc::new(budget))
        } else {
            let config = GovernorConfigBuilder::default()
                .key_extractor(keys)
                .period(period)
                .burst_size(burst)
                .finish()
                .ok_or_else(invalid)?;
            Budget::EveryRequest(Arc::new(config))
        };

        Ok(Self {
            tier,
            limit,
            keys,
            budget,
        })
    }

    /// Human readable budget, e.g. `5 attempts per 15 minutes`.
    pub fn describe(&self) -> String {
        describe_budget(self.tier, self.limit)
    }

    /// Wrap `router` in this tier's limiter and the JSON rejection renderer.
    pub fn apply<S>(&self, router: Router<S>, security: &SecurityLogger) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let rejection = Rejection {
            tier: self.tier,
            retry_after: describe_window(self.limit.window),
            trust_proxy: self.keys.trust_proxy,
            security: security.clone(),
        };
        let limited = match &self.budget {
            Budget::EveryRequest(config) => {
                let limiter: RateLimiterLayer = GovernorLayer::new(config.clone());
                router.layer(limiter)
            }
            Budget::FailedRequests(budget) => {
                router.layer(middleware::from_fn_with_state(budget.clone(), count_failures))
            }
        };
        limited.layer(middleware::from_fn_with_state(rejection, render_rejection))
    }

    fn retain_recent(&self) {
        match &self.budget {
            Budget::EveryRequest(config) => config.limiter().retain_recent(),
            Budget::FailedRequests(budget) => budget.retain_recent(),
        }
    }
}

/// Per-client budget that is only spent by non-2xx responses. Once a client
/// has used the last slot it is refused up front until a slot replenishes.
struct FailureBudget {
    keys: ClientIpKeyExtractor,
    period: Duration,
    limiter: FailureLimiter,
    blocked: Mutex<HashMap<IpAddr, Instant>>,
}

impl FailureBudget {
    fn new(keys: ClientIpKeyExtractor, period: Duration, burst: NonZeroU32) -> Option<Self> {
        let quota = Quota::with_period(period)?.allow_burst(burst);
        Some(Self {
            keys,
            period,
            limiter: RateLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>(),
            blocked: Mutex::new(HashMap::new()),
        })
    }

    fn blocked_for(&self, key: &IpAddr) -> Option<Duration> {
        let blocked = self.blocked.lock().unwrap_or_else(PoisonError::into_inner);
        blocked
            .get(key)
            .and_then(|until| until.checked_duration_since(Instant::now()))
            .filter(|wait| !wait.is_zero())
    }

    fn record_failure(&self, key: IpAddr) {
        let exhausted = match self.limiter.check_key(&key) {
            Ok(snapshot) => snapshot.remaining_burst_capacity() == 0,
            Err(_) => true,
        };
        if exhausted {
            self.blocked
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, Instant::now() + self.period);
        }
    }

    fn retain_recent(&self) {
        self.limiter.retain_recent();
        let now = Instant::now();
        self.blocked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, until| *until > now);
    }
}

async fn count_failures(
    State(budget): State<Arc<FailureBudget>>,
    request: Request,
    next: Next,
) -> Response {
    let key = budget.keys.key_for(&request);
    if let Some(wait) = budget.blocked_for(&key) {
        let retry_after = wait.as_secs().max(1).to_string();
        return (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, retry_after)]).into_response();
    }

    let response = next.run(request).await;
    if !response.status().is_success() {
        budget.record_failure(key);
    }
    response
}

#[derive(Clone)]
pub struct RateLimiters {
    pub general: TierLimiter,
    pub auth: TierLimiter,
    pub payment: TierLimiter,
    pub password_reset: TierLimiter,
    pub registration: TierLimiter,
    pub api: TierLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> anyhow::Result<Self> {
        let tier = |tier, limit| TierLimiter::new(tier, limit, config.trust_proxy);
        Ok(Self {
            general: tier(RateTier::General, config.general)?,
            auth: tier(RateTier::Auth, config.auth)?,
            payment: tier(RateTier::Payment, config.payment)?,
            password_reset: tier(RateTier::PasswordReset, config.password_reset)?,
            registration: tier(RateTier::Registration, config.registration)?,
            api: tier(RateTier::Api, config.api)?,
        })
    }

    pub fn all(&self) -> [&TierLimiter; 6] {
        [
            &self.general,
            &self.auth,
            &self.payment,
            &self.password_reset,
            &self.registration,
            &self.api,
        ]
    }

    /// Periodically drop limiter state for clients that have gone quiet.
    pub fn spawn_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let limiters = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                for limiter in limiters.all() {
                    limiter.retain_recent();
                }
                tracing::debug!("rate limiter state pruned");
            }
        })
    }
}

#[derive(Clone)]
struct Rejection {
    tier: RateTier,
    retry_after: String,
    trust_proxy: bool,
    security: SecurityLogger,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitBody<'a> {
    success: bool,
    error: &'a str,
    retry_after: &'a str,
}

async fn render_rejection(
    State(rejection): State<Rejection>,
    request: Request,
    next: Next,
) -> Response {
    let info = request_info(
        request.method(),
        request.uri(),
        request.headers(),
        request.extensions(),
        rejection.trust_proxy,
    );
    let response = next.run(request).await;

    // Handlers answer 429 with JSON of their own; only limiter output is rewritten.
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if response.status() != StatusCode::TOO_MANY_REQUESTS || is_json {
        return response;
    }

    rejection
        .security
        .record(
            SecurityEvent::RateLimitExceeded,
            &info,
            serde_json::json!({
                "statusCode": 429,
                "tier": rejection.tier.name(),
                "responseData": {
                    "success": false,
                    "error": rejection.tier.message(),
                    "retryAfter": rejection.retry_after,
                },
            }),
        )
        .await;

    let mut rendered = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RateLimitBody {
            success: false,
            error: rejection.tier.message(),
            retry_after: &rejection.retry_after,
        }),
    )
        .into_response();

    for name in [header::RETRY_AFTER, HeaderName::from_static("x-ratelimit-after")] {
        if let Some(value) = response.headers().get(&name) {
            rendered.headers_mut().insert(name.clone(), value.clone());
        }
    }
    rendered
}

fn describe_budget(tier: RateTier, limit: RateLimitTier) -> String {
    format!(
        "{} {} per {}",
        limit.max,
        tier.unit(),
        describe_window(limit.window)
    )
}

/// Every tier's budget keyed by tier name.
pub fn describe_limits(config: &RateLimitConfig) -> BTreeMap<&'static str, String> {
    [
        (RateTier::General, config.general),
        (RateTier::Auth, config.auth),
        (RateTier::Payment, config.payment),
        (RateTier::PasswordReset, config.password_reset),
        (RateTier::Registration, config.registration),
        (RateTier::Api, config.api),
    ]
    .into_iter()
    .map(|(tier, limit)| (tier.name(), describe_budget(tier, limit)))
    .collect()
}

pub fn describe_window(window: Duration) -> String {
    let secs = window.as_secs();
    let (amount, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if amount == 1 {
        format!("1 {unit}")
    } else {
        format!("{amount} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{extract::ConnectInfo, routing::get};
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn windows_are_described_in_the_largest_whole_unit() {
        assert_eq!(describe_window(Duration::from_secs(15 * 60)), "15 minutes");
        assert_eq!(describe_window(Duration::from_secs(3600)), "1 hour");
        assert_eq!(describe_window(Duration::from_secs(60)), "1 minute");
        assert_eq!(describe_window(Duration::from_secs(90)), "90 seconds");
    }

    #[test]
    fn default_tiers_describe_their_budgets() {
        let limiters = RateLimiters::from_config(&RateLimitConfig::default()).expect("limiters");
        assert_eq!(limiters.general.describe(), "100 requests per 15 minutes");
        assert_eq!(limiters.auth.describe(), "5 attempts per 15 minutes");
        assert_eq!(limiters.payment.describe(), "3 attempts per 5 minutes");
        assert_eq!(limiters.password_reset.describe(), "3 attempts per 1 hour");
        assert_eq!(limiters.api.describe(), "60 requests per 1 minute");
    }

    #[test]
    fn unresolvable_clients_share_one_bucket() {
        let request = http::Request::builder().body(()).expect("request");
        let key = ClientIpKeyExtractor { trust_proxy: false }
            .extract(&request)
            .expect("key");
        assert_eq!(key, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn forwarded_headers_only_key_behind_a_trusted_proxy() {
        let mut request = http::Request::builder()
            .header("x-forwarded-for", "203.0.113.50")
            .body(())
            .expect("request");
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 5000))));

        let direct = ClientIpKeyExtractor { trust_proxy: false };
        let proxied = ClientIpKeyExtractor { trust_proxy: true };
        assert_eq!(direct.extract(&request).expect("key"), IpAddr::from([10, 0, 0, 9]));
        assert_eq!(proxied.extract(&request).expect("key"), IpAddr::from([203, 0, 113, 50]));
    }

    fn auth_app(max: u32) -> Router {
        let limiter = TierLimiter::new(RateTier::Auth, RateLimitTier::new(max, 60), false)
            .expect("limiter");
        let security = SecurityLogger::new(
            std::env::temp_dir().join(format!("sparklenest-rate-{}.log", uuid::Uuid::new_v4())),
        );
        limiter.apply(
            Router::new()
                .route("/ok", get(|| async { "signed in" }))
                .route("/fail", get(|| async { StatusCode::UNAUTHORIZED })),
            &security,
        )
    }

    fn from_peer(path: &str, ip: [u8; 4]) -> Request {
        let mut request = http::Request::get(path).body(Body::empty()).expect("request");
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 4000))));
        request
    }

    #[tokio::test]
    async fn successful_auth_requests_do_not_spend_the_budget() {
        let app = auth_app(2);

        for _ in 0..10 {
            let response = app.clone().oneshot(from_peer("/ok", [198, 51, 100, 8])).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        for _ in 0..2 {
            let response = app.clone().oneshot(from_peer("/fail", [198, 51, 100, 8])).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let blocked = app.clone().oneshot(from_peer("/ok", [198, 51, 100, 8])).await.unwrap();
        assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(blocked.headers().contains_key(header::RETRY_AFTER));

        let other = app.oneshot(from_peer("/fail", [198, 51, 100, 9])).await.unwrap();
        assert_eq!(other.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn other_tiers_count_every_request() {
        let limiter = TierLimiter::new(RateTier::Payment, RateLimitTier::new(2, 60), false)
            .expect("limiter");
        let security = SecurityLogger::new(
            std::env::temp_dir().join(format!("sparklenest-rate-{}.log", uuid::Uuid::new_v4())),
        );
        let app = limiter.apply(Router::new().route("/ok", get(|| async { "paid" })), &security);

        for _ in 0..2 {
            let response = app.clone().oneshot(from_peer("/ok", [192, 0, 2, 77])).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let blocked = app.oneshot(from_peer("/ok", [192, 0, 2, 77])).await.unwrap();
        assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
