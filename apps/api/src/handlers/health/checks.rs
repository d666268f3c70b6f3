use redis::AsyncCommands;

use super::*;

fn ok() -> HealthDependencyStatus {
    HealthDependencyStatus {
        status: "ok",
        detail: None,
    }
}

fn failed(detail: String) -> HealthDependencyStatus {
    HealthDependencyStatus {
        status: "error",
        detail: Some(detail),
    }
}

/// Probes the credential table so a database without migrations reports as
/// unhealthy.
pub(super) async fn check_postgres(pool: sqlx::PgPool) -> HealthDependencyStatus {
    let probe = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM temp_credentials WHERE is_active LIMIT 1)",
    )
    .fetch_one(&pool)
    .await;

    match probe {
        Ok(_) => ok(),
        Err(error) => failed(format!("postgres check failed: {error}")),
    }
}

/// Redis only backs the cross-process mint lease; it is `disabled` when the
/// lease is process-local.
pub(super) async fn check_redis(
    redis_client: Option<redis::Client>,
    redis_required: bool,
) -> HealthDependencyStatus {
    let Some(redis_client) = redis_client else {
        return if redis_required {
            failed("mint lease backend is redis but no client is configured".to_owned())
        } else {
            HealthDependencyStatus {
                status: "disabled",
                detail: None,
            }
        };
    };

    let mut connection = match redis_client.get_multiplexed_async_connection().await {
        Ok(connection) => connection,
        Err(error) => return failed(format!("redis connection failed: {error}")),
    };

    match connection.ping::<String>().await {
        Ok(reply) if reply.eq_ignore_ascii_case("pong") => ok(),
        Ok(reply) => failed(format!("unexpected redis ping reply: {reply}")),
        Err(error) => failed(format!("redis ping failed: {error}")),
    }
}
