use super::checks::{check_postgres, check_redis};
use super::*;

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (postgres, redis) = tokio::join!(
        check_postgres(state.postgres_pool.clone()),
        check_redis(state.redis_client.clone(), state.redis_required),
    );

    let ready = is_ready(&postgres, &redis, state.redis_required);
    let http_status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(HealthResponse {
            status: if ready { "ok" } else { "degraded" },
            ready,
            mint_lease_backend: if state.redis_required {
                "redis"
            } else {
                "local"
            },
            postgres,
            redis,
        }),
    )
}

/// A failing optional Redis does not block issuance; the local lease still
/// serializes mints inside this process.
fn is_ready(
    postgres: &HealthDependencyStatus,
    redis: &HealthDependencyStatus,
    redis_required: bool,
) -> bool {
    postgres.status == "ok" && (!redis_required || redis.status == "ok")
}
