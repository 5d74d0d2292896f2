mod support;

use chrono::{Duration, Utc};
use pocketnews::engagement::EngagementService;
use pocketnews::retention;
use pocketnews::storage::news;
use support::{add_category, add_news_expiring, memory_pool, news_count};

#[tokio::test]
async fn sweep_removes_exactly_the_expired_rows() {
    let pool = memory_pool().await;
    let cat = add_category(&pool, "World", "world", 1).await;
    let now = Utc::now();

    let expired = add_news_expiring(
        &pool,
        cat.id,
        "https://r.example.com/expired",
        now - Duration::hours(50),
        now - Duration::hours(2),
    )
    .await;
    let boundary = add_news_expiring(&pool, cat.id, "https://r.example.com/boundary", now - Duration::hours(48), now).await;
    let fresh = add_news_expiring(
        &pool,
        cat.id,
        "https://r.example.com/fresh",
        now - Duration::hours(1),
        now + Duration::hours(47),
    )
    .await;

    let engagement = EngagementService::new(pool.clone(), 7);
    engagement.like(fresh, "device").await.expect("like fresh");
    sqlx::query("INSERT INTO news_likes (news_id, device_id, created_at) VALUES (?, 'device', ?)")
        .bind(expired)
        .bind(now)
        .execute(&pool)
        .await
        .expect("like expired");

    let deleted = retention::sweep(&pool, now).await.expect("sweep");
    assert_eq!(deleted, 1);
    assert_eq!(news_count(&pool).await, 2);

    assert!(news::find_by_id(&pool, expired).await.expect("query").is_none());
    // Expiry equal to the cutoff is not strictly before it.
    assert!(news::find_by_id(&pool, boundary).await.expect("query").is_some());
    assert!(news::find_by_id(&pool, fresh).await.expect("query").is_some());

    let orphan_likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news_likes WHERE news_id = ?")
        .bind(expired)
        .fetch_one(&pool)
        .await
        .expect("count likes");
    assert_eq!(orphan_likes, 0);

    assert_eq!(retention::sweep(&pool, now).await.expect("second sweep"), 0);
}
