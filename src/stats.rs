use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::Gateway;
use crate::models::{MonthlyStat, Todo};

pub const MONTHLY_STATS_LIMIT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Totals {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
}

pub fn compute_totals(todos: &[Todo]) -> Totals {
    let total = todos.len() as u64;
    let completed = todos.iter().filter(|todo| todo.completed).count() as u64;
    Totals {
        total,
        completed,
        pending: total - completed,
    }
}

/// The most recent months of the backend aggregate, newest first.
pub async fn fetch_monthly_stats(
    gateway: &dyn Gateway,
    access_token: &str,
    user_id: Uuid,
) -> Result<Vec<MonthlyStat>, AppError> {
    let mut stats = gateway
        .monthly_stats(access_token, user_id, MONTHLY_STATS_LIMIT)
        .await?;
    stats.truncate(MONTHLY_STATS_LIMIT);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::macros::datetime;

    use crate::gateway::LocalGateway;

    fn todo(completed: bool) -> Todo {
        Todo {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            text: "x".to_string(),
            completed,
            created_at: None,
        }
    }

    #[test]
    fn totals_add_up() {
        for (done, open) in [(0, 0), (3, 1), (0, 5), (7, 0)] {
            let todos: Vec<Todo> = (0..done)
                .map(|_| todo(true))
                .chain((0..open).map(|_| todo(false)))
                .collect();
            let totals = compute_totals(&todos);
            assert_eq!(totals.total, totals.completed + totals.pending);
            assert_eq!(totals.completed, done);
            assert_eq!(totals.pending, open);
        }
    }

    #[test]
    fn empty_collection_is_all_zero() {
        assert_eq!(compute_totals(&[]), Totals::default());
    }

    #[tokio::test]
    async fn monthly_stats_are_capped_and_newest_first() {
        let local = Arc::new(LocalGateway::open_in_memory().unwrap().with_auto_confirm(true));
        local.sign_up("user@example.com", "secret1").await.unwrap();
        let session = local.sign_in("user@example.com", "secret1").await.unwrap();
        let months = [
            datetime!(2023-12-05 10:00 UTC),
            datetime!(2024-01-05 10:00 UTC),
            datetime!(2024-02-05 10:00 UTC),
            datetime!(2024-03-05 10:00 UTC),
            datetime!(2024-04-05 10:00 UTC),
            datetime!(2024-05-05 10:00 UTC),
            datetime!(2024-06-05 10:00 UTC),
            datetime!(2024-07-05 10:00 UTC),
        ];
        for at in months {
            local.seed_todo(session.user.id, "t", false, at).unwrap();
        }

        let stats = fetch_monthly_stats(local.as_ref(), &session.access_token, session.user.id)
            .await
            .unwrap();
        let labels: Vec<_> = stats.iter().map(|s| s.month.as_str()).collect();
        assert_eq!(
            labels,
            ["2024-07", "2024-06", "2024-05", "2024-04", "2024-03", "2024-02"]
        );
    }
}
