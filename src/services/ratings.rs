use sqlx::PgPool;
use uuid::Uuid;

/// Stored for a nursery that has no reviews.
pub const DEFAULT_RATINGS_AVERAGE: f64 = 1.0;

/// Turns a (count, mean) aggregate into the stored (quantity, average) pair.
pub fn summarize(count: i64, mean: Option<f64>) -> (i32, f64) {
    match mean {
        Some(mean) if count > 0 => (count as i32, (mean * 10.0).round() / 10.0),
        _ => (0, DEFAULT_RATINGS_AVERAGE),
    }
}

/// Recomputes `ratings_quantity` / `ratings_average` for a nursery from its reviews.
///
/// Called after every review write has committed. Each call re-reads the full
/// aggregate, so concurrent writers converge on the same result.
pub async fn recalculate(pool: &PgPool, nursery_id: Uuid) -> Result<(), sqlx::Error> {
    let (count, mean): (i64, Option<f64>) = sqlx::query_as(
        "SELECT COUNT(*)::BIGINT, AVG(rating)::DOUBLE PRECISION
         FROM reviews WHERE nursery_id = $1",
    )
    .bind(nursery_id)
    .fetch_one(pool)
    .await?;

    let (quantity, average) = summarize(count, mean);

    sqlx::query("UPDATE nurseries SET ratings_quantity = $1, ratings_average = $2 WHERE id = $3")
        .bind(quantity)
        .bind(average)
        .bind(nursery_id)
        .execute(pool)
        .await?;

    tracing::debug!(%nursery_id, quantity, average, "Ratings recalculated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean(ratings: &[i32]) -> Option<f64> {
        if ratings.is_empty() {
            return None;
        }
        Some(ratings.iter().sum::<i32>() as f64 / ratings.len() as f64)
    }

    #[test]
    fn no_reviews_resets_to_default() {
        assert_eq!(summarize(0, None), (0, 1.0));
    }

    #[test]
    fn mean_is_rounded_to_one_decimal() {
        let ratings = [5, 4, 4];
        assert_eq!(summarize(3, mean(&ratings)), (3, 4.3));

        let ratings = [5, 4];
        assert_eq!(summarize(2, mean(&ratings)), (2, 4.5));

        let ratings = [1, 2, 2];
        assert_eq!(summarize(3, mean(&ratings)), (3, 1.7));
    }

    #[test]
    fn single_review_is_its_own_average() {
        assert_eq!(summarize(1, Some(3.0)), (1, 3.0));
    }
}
