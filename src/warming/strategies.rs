//! Built-in Warming Strategies
//!
//! Each warmer reads a working set from the repository and writes it through
//! the cache with invalidation tags.
//!
//! | Strategy            | Priority  | Interval | Key                        | Tags               |
//! |---------------------|-----------|----------|----------------------------|--------------------|
//! | `popular-exercises` | critical  | 15 min   | `exercise:{id}`            | niveau, matiere    |
//! | `active-students`   | critical  | 5 min    | `student:{id}`             | `student:{id}`     |
//! | `curriculum-levels` | important | 1 h      | `static:curriculum-levels` | `curriculum`       |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::strategy::{WarmAction, WarmingPriority, WarmingStrategy};
use crate::cache::{CacheOptions, TieredCache};
use crate::domain::ports::{column_str, DataRepository, Row};
use crate::error::{Error, Result};

/// Cache of raw repository rows
pub type JsonCache = TieredCache<Value>;

pub const POPULAR_EXERCISES: &str = "popular-exercises";
pub const ACTIVE_STUDENTS: &str = "active-students";
pub const CURRICULUM_LEVELS: &str = "curriculum-levels";

/// Exercises most accessed over the last 7 days, `$1` = limit
pub const POPULAR_EXERCISES_QUERY: &str = "SELECT e.*, COUNT(a.id) AS access_count \
     FROM exercises e JOIN exercise_attempts a ON a.exercise_id = e.id \
     WHERE a.created_at > NOW() - INTERVAL '7 days' \
     GROUP BY e.id ORDER BY access_count DESC LIMIT $1";

/// Students active over the last 24 hours, `$1` = limit
pub const ACTIVE_STUDENTS_QUERY: &str = "SELECT s.* FROM students s \
     WHERE s.last_active_at > NOW() - INTERVAL '24 hours' \
     ORDER BY s.last_active_at DESC LIMIT $1";

/// Level / subject taxonomy
pub const CURRICULUM_LEVELS_QUERY: &str =
    "SELECT DISTINCT niveau, matiere FROM exercises ORDER BY niveau, matiere";

pub const POPULAR_EXERCISES_LIMIT: usize = 100;
pub const ACTIVE_STUDENTS_LIMIT: usize = 50;

pub const POPULAR_EXERCISES_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const ACTIVE_STUDENTS_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const CURRICULUM_LEVELS_INTERVAL: Duration = Duration::from_secs(60 * 60);

async fn fetch(
    repository: &dyn DataRepository,
    strategy: &str,
    query: &str,
    params: &[Value],
) -> Result<Vec<Row>> {
    repository
        .execute(query, params)
        .await
        .map_err(|e| Error::WarmingFailed {
            strategy: strategy.to_string(),
            reason: e.to_string(),
        })
}

/// Warms `exercise:{id}` tagged with the exercise's level and subject
pub struct PopularExercisesWarmer {
    repository: Arc<dyn DataRepository>,
    cache: Arc<JsonCache>,
    limit: usize,
}

impl PopularExercisesWarmer {
    pub fn new(repository: Arc<dyn DataRepository>, cache: Arc<JsonCache>) -> Self {
        Self {
            repository,
            cache,
            limit: POPULAR_EXERCISES_LIMIT,
        }
    }
}

#[async_trait]
impl WarmAction for PopularExercisesWarmer {
    async fn execute(&self) -> Result<usize> {
        let rows = fetch(
            self.repository.as_ref(),
            POPULAR_EXERCISES,
            POPULAR_EXERCISES_QUERY,
            &[Value::from(self.limit)],
        )
        .await?;

        let mut written = 0;
        for row in rows {
            let Some(id) = column_str(&row, "id") else {
                warn!(strategy = POPULAR_EXERCISES, "Row without id, skipped");
                continue;
            };
            let tags = ["niveau", "matiere"]
                .iter()
                .filter_map(|column| column_str(&row, column));
            let options = CacheOptions::new().with_prefix("exercise").with_tags(tags);

            self.cache.set(&id, Value::Object(row), &options).await;
            written += 1;
        }

        debug!(strategy = POPULAR_EXERCISES, written, "Exercises warmed");
        Ok(written)
    }
}

/// Warms `student:{id}` tagged with the student's own tag
pub struct ActiveStudentsWarmer {
    repository: Arc<dyn DataRepository>,
    cache: Arc<JsonCache>,
    limit: usize,
}

impl ActiveStudentsWarmer {
    pub fn new(repository: Arc<dyn DataRepository>, cache: Arc<JsonCache>) -> Self {
        Self {
            repository,
            cache,
            limit: ACTIVE_STUDENTS_LIMIT,
        }
    }
}

#[async_trait]
impl WarmAction for ActiveStudentsWarmer {
    async fn execute(&self) -> Result<usize> {
        let rows = fetch(
            self.repository.as_ref(),
            ACTIVE_STUDENTS,
            ACTIVE_STUDENTS_QUERY,
            &[Value::from(self.limit)],
        )
        .await?;

        let mut written = 0;
        for row in rows {
            let Some(id) = column_str(&row, "id") else {
                warn!(strategy = ACTIVE_STUDENTS, "Row without id, skipped");
                continue;
            };
            let options = CacheOptions::new()
                .with_prefix("student")
                .with_tag(format!("student:{}", id));

            self.cache.set(&id, Value::Object(row), &options).await;
            written += 1;
        }

        debug!(strategy = ACTIVE_STUDENTS, written, "Students warmed");
        Ok(written)
    }
}

/// Warms the whole taxonomy as one `static:curriculum-levels` entry
pub struct CurriculumLevelsWarmer {
    repository: Arc<dyn DataRepository>,
    cache: Arc<JsonCache>,
}

impl CurriculumLevelsWarmer {
    pub fn new(repository: Arc<dyn DataRepository>, cache: Arc<JsonCache>) -> Self {
        Self { repository, cache }
    }
}

#[async_trait]
impl WarmAction for CurriculumLevelsWarmer {
    async fn execute(&self) -> Result<usize> {
        let rows = fetch(
            self.repository.as_ref(),
            CURRICULUM_LEVELS,
            CURRICULUM_LEVELS_QUERY,
            &[],
        )
        .await?;

        let levels = Value::Array(rows.into_iter().map(Value::Object).collect());
        let options = CacheOptions::new().with_prefix("static").with_tag("curriculum");
        self.cache.set("curriculum-levels", levels, &options).await;
        Ok(1)
    }
}

/// The three built-in strategies, enabled
pub fn default_strategies(
    repository: Arc<dyn DataRepository>,
    cache: Arc<JsonCache>,
) -> Vec<WarmingStrategy> {
    vec![
        WarmingStrategy::new(
            POPULAR_EXERCISES,
            WarmingPriority::Critical,
            POPULAR_EXERCISES_INTERVAL,
            PopularExercisesWarmer::new(repository.clone(), cache.clone()),
        ),
        WarmingStrategy::new(
            ACTIVE_STUDENTS,
            WarmingPriority::Critical,
            ACTIVE_STUDENTS_INTERVAL,
            ActiveStudentsWarmer::new(repository.clone(), cache.clone()),
        ),
        WarmingStrategy::new(
            CURRICULUM_LEVELS,
            WarmingPriority::Important,
            CURRICULUM_LEVELS_INTERVAL,
            CurriculumLevelsWarmer::new(repository, cache),
        ),
    ]
}

// =============================================================================
// Tests
// =============================================================================
