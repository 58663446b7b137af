use sqlx::Result;

use super::{CategoryRecord, Database, FeatureRecord, FeatureType};

/// 写入或覆盖一条特征记录，完整主键保证幂等
pub async fn upsert_feature(db: &Database, record: &FeatureRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO feature (media_key, feat_type, sub_index, vector, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.media_key)
    .bind(record.feat_type)
    .bind(record.sub_index)
    .bind(&record.vector)
    .bind(record.updated_at)
    .execute(db)
    .await?;

    Ok(())
}

/// 检查某资产是否已有指定类型的特征
pub async fn feature_exists(db: &Database, key: &str, ty: FeatureType) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM feature WHERE media_key = ? AND feat_type = ?",
    )
    .bind(key)
    .bind(ty.code())
    .fetch_one(db)
    .await?;

    Ok(count > 0)
}

/// 读取 sub_index = 0 的向量（单实例特征）
pub async fn vector_for(db: &Database, key: &str, ty: FeatureType) -> Result<Option<Vec<u8>>> {
    sqlx::query_scalar(
        "SELECT vector FROM feature WHERE media_key = ? AND feat_type = ? AND sub_index = 0",
    )
    .bind(key)
    .bind(ty.code())
    .fetch_optional(db)
    .await
}

/// 读取某资产指定类型的全部记录（人脸等多实例特征）
pub async fn vectors_for(db: &Database, key: &str, ty: FeatureType) -> Result<Vec<FeatureRecord>> {
    sqlx::query_as(
        "SELECT * FROM feature WHERE media_key = ? AND feat_type = ? ORDER BY sub_index",
    )
    .bind(key)
    .bind(ty.code())
    .fetch_all(db)
    .await
}

/// 分页读取某类型的全部记录，用于索引重建和线性兜底扫描
pub async fn features_paged(
    db: &Database,
    ty: FeatureType,
    limit: usize,
    offset: usize,
) -> Result<Vec<FeatureRecord>> {
    sqlx::query_as(
        r#"
        SELECT * FROM feature WHERE feat_type = ?
        ORDER BY media_key, sub_index
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(ty.code())
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(db)
    .await
}

pub async fn count_of_type(db: &Database, ty: FeatureType) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feature WHERE feat_type = ?")
        .bind(ty.code())
        .fetch_one(db)
        .await?;
    Ok(count as u64)
}

/// 返回特征表中出现过的全部 media_key，用于删除级联
pub async fn all_media_keys(db: &Database) -> Result<Vec<String>> {
    sqlx::query_scalar("SELECT DISTINCT media_key FROM feature").fetch_all(db).await
}

/// 删除某资产的全部派生数据
pub async fn delete_by_key(db: &Database, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM feature WHERE media_key = ?").bind(key).execute(db).await?;
    sqlx::query("DELETE FROM category WHERE media_key = ?").bind(key).execute(db).await?;
    Ok(())
}

pub async fn delete_by_key_and_type(db: &Database, key: &str, ty: FeatureType) -> Result<()> {
    sqlx::query("DELETE FROM feature WHERE media_key = ? AND feat_type = ?")
        .bind(key)
        .bind(ty.code())
        .execute(db)
        .await?;
    Ok(())
}

pub async fn delete_by_type(db: &Database, ty: FeatureType) -> Result<()> {
    sqlx::query("DELETE FROM feature WHERE feat_type = ?").bind(ty.code()).execute(db).await?;
    Ok(())
}

pub async fn upsert_categories(db: &Database, records: &[CategoryRecord]) -> Result<()> {
    let mut tx = db.begin().await?;
    for record in records {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO category (media_key, label, score, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&record.media_key)
        .bind(&record.label)
        .bind(record.score)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn categories_for(db: &Database, key: &str) -> Result<Vec<CategoryRecord>> {
    sqlx::query_as("SELECT * FROM category WHERE media_key = ? ORDER BY score DESC")
        .bind(key)
        .fetch_all(db)
        .await
}

pub async fn delete_categories_by_key(db: &Database, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM category WHERE media_key = ?").bind(key).execute(db).await?;
    Ok(())
}

pub async fn delete_all_categories(db: &Database) -> Result<()> {
    sqlx::query("DELETE FROM category").execute(db).await?;
    Ok(())
}

pub async fn meta_get(db: &Database, key: &str) -> Result<Option<String>> {
    sqlx::query_scalar("SELECT value FROM meta WHERE key = ?").bind(key).fetch_optional(db).await
}

pub async fn meta_set(db: &Database, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(db)
        .await?;
    Ok(())
}
