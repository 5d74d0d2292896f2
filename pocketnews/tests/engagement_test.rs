mod support;

use chrono::{Duration, Utc};
use pocketnews::engagement::EngagementService;
use pocketnews::error::NewsError;
use support::{add_category, add_news, add_news_expiring, memory_pool};

#[tokio::test]
async fn likes_are_idempotent_per_device() {
    let pool = memory_pool().await;
    let cat = add_category(&pool, "World", "world", 1).await;
    let id = add_news(&pool, cat.id, "https://e.example.com/1", Utc::now()).await;
    let svc = EngagementService::new(pool.clone(), 7);

    let first = svc.like(id, "phone").await.expect("like");
    let again = svc.like(id, "phone").await.expect("like again");
    assert!(first.liked && again.liked);
    assert_eq!(again.like_count, 1);

    svc.like(id, "tablet").await.expect("second device");
    assert_eq!(svc.like_status(id, "phone").await.expect("status").like_count, 2);

    let after = svc.unlike(id, "phone").await.expect("unlike");
    assert!(!after.liked);
    assert_eq!(after.like_count, 1);
    assert_eq!(svc.unlike(id, "phone").await.expect("unlike again").like_count, 1);

    assert!(matches!(svc.like(999, "phone").await, Err(NewsError::NotFound(_))));
    assert!(matches!(svc.like(id, "  ").await, Err(NewsError::Validation(_))));
}

#[tokio::test]
async fn bookmarks_upsert_and_expire() {
    let pool = memory_pool().await;
    let cat = add_category(&pool, "World", "world", 1).await;
    let older = add_news(&pool, cat.id, "https://e.example.com/older", Utc::now() - Duration::minutes(10)).await;
    let newer = add_news(&pool, cat.id, "https://e.example.com/newer", Utc::now()).await;
    let svc = EngagementService::new(pool.clone(), 7);

    let first = svc.add_bookmark(older, "phone").await.expect("bookmark");
    let again = svc.add_bookmark(older, "phone").await.expect("bookmark again");
    assert_eq!(first.created_at, again.created_at);
    assert_eq!(first.expires_at - first.created_at, Duration::days(7));

    svc.add_bookmark(newer, "phone").await.expect("bookmark newer");
    let page = svc.list_bookmarks("phone", 0, 10).await.expect("list");
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].id, newer);

    let status = svc.bookmark_status(older, "phone").await.expect("status");
    assert!(status.bookmarked);

    // A lapsed bookmark is replaced by a fresh one.
    sqlx::query("UPDATE bookmarks SET expires_at = ? WHERE news_id = ?")
        .bind(Utc::now() - Duration::days(1))
        .bind(older)
        .execute(&pool)
        .await
        .expect("expire bookmark");
    assert!(!svc.bookmark_status(older, "phone").await.expect("status").bookmarked);
    let renewed = svc.add_bookmark(older, "phone").await.expect("renew");
    assert!(renewed.expires_at > Utc::now());

    svc.remove_bookmark(older, "phone").await.expect("remove");
    svc.remove_bookmark(older, "phone").await.expect("remove again");
    assert_eq!(svc.list_bookmarks("phone", 0, 10).await.expect("list").total, 1);
}

#[tokio::test]
async fn expired_news_cannot_be_liked_or_bookmarked() {
    let pool = memory_pool().await;
    let cat = add_category(&pool, "World", "world", 1).await;
    let now = Utc::now();
    let expired = add_news_expiring(
        &pool,
        cat.id,
        "https://e.example.com/stale",
        now - Duration::hours(5),
        now - Duration::hours(1),
    )
    .await;
    let svc = EngagementService::new(pool.clone(), 7);

    assert!(matches!(svc.like(expired, "phone").await, Err(NewsError::NotFound(_))));
    assert!(matches!(svc.add_bookmark(expired, "phone").await, Err(NewsError::NotFound(_))));
}
