//! Course filter
//!
//! `FilterState` is the value object the catalog screen edits; `FilterEngine`
//! evaluates it over courses. Predicates run cheapest first and stop at the
//! first failure:
//!
//! 1. collection scope
//! 2. search text (title, author, description, optionally lesson titles)
//! 3. category
//! 4. credits (any of)
//! 5. designations (required / recommended)
//! 6. completion status (any of)
//! 7. rating bucket
//! 8. date window

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::course::Course;
use crate::config::FilterConfig;

/// Category value that matches every course
pub const ALL_CATEGORIES: &str = "All";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Designation {
    Required,
    /// Saved to any collection
    Recommended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl CompletionStatus {
    pub fn of(progress: u8) -> Self {
        match progress {
            0 => CompletionStatus::NotStarted,
            p if p >= 100 => CompletionStatus::Completed,
            _ => CompletionStatus::InProgress,
        }
    }
}

/// Rating bucket: `ALL`, `NOT_RATED` or `<N>_PLUS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RatingFilter {
    #[default]
    All,
    NotRated,
    AtLeast(u8),
}

impl RatingFilter {
    fn admits(&self, rating: f32) -> bool {
        match self {
            RatingFilter::All => true,
            RatingFilter::NotRated => rating == 0.0,
            RatingFilter::AtLeast(n) => rating >= f32::from(*n),
        }
    }
}

impl fmt::Display for RatingFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatingFilter::All => write!(f, "ALL"),
            RatingFilter::NotRated => write!(f, "NOT_RATED"),
            RatingFilter::AtLeast(n) => write!(f, "{}_PLUS", n),
        }
    }
}

impl FromStr for RatingFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        match upper.as_str() {
            "ALL" => Ok(RatingFilter::All),
            "NOT_RATED" => Ok(RatingFilter::NotRated),
            other => other
                .strip_suffix("_PLUS")
                .and_then(|n| n.parse::<u8>().ok())
                .map(RatingFilter::AtLeast)
                .ok_or_else(|| format!("unknown rating filter '{}'", s)),
        }
    }
}

impl TryFrom<String> for RatingFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RatingFilter> for String {
    fn from(value: RatingFilter) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateFilter {
    #[default]
    All,
    SinceLogin,
    ThisMonth,
    LastXDays,
}

impl FromStr for DateFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "ALL" => Ok(DateFilter::All),
            "SINCE_LOGIN" => Ok(DateFilter::SinceLogin),
            "THIS_MONTH" => Ok(DateFilter::ThisMonth),
            "LAST_X_DAYS" => Ok(DateFilter::LastXDays),
            _ => Err(format!("unknown date filter '{}'", s)),
        }
    }
}

/// Filter criteria for the course catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState {
    pub search_query: String,
    pub category: String,
    pub credits: BTreeSet<String>,
    pub designations: BTreeSet<Designation>,
    pub status: BTreeSet<CompletionStatus>,
    pub rating_filter: RatingFilter,
    pub date_filter_type: DateFilter,
    /// Raw user input for `LAST_X_DAYS`
    pub custom_days: String,
    /// Search lesson titles too
    pub include_lessons: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search_query: String::new(),
            category: ALL_CATEGORIES.to_string(),
            credits: BTreeSet::new(),
            designations: BTreeSet::new(),
            status: BTreeSet::new(),
            rating_filter: RatingFilter::All,
            date_filter_type: DateFilter::All,
            custom_days: String::new(),
            include_lessons: false,
        }
    }
}

impl FilterState {
    /// Filters that let every course through
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn is_initial(&self) -> bool {
        *self == Self::initial()
    }

    /// `custom_days` as a day count; unparsable or negative input counts as 0
    pub fn custom_days(&self) -> i64 {
        self.custom_days
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|d| *d >= 0)
            .unwrap_or(0)
    }
}

/// Evaluates `FilterState` over courses. Pure, no I/O.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    since_login: Duration,
    all_courses_scopes: Vec<String>,
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}

impl FilterEngine {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            since_login: Duration::days(config.since_login_days.max(0)),
            all_courses_scopes: config.all_courses_scopes.clone(),
        }
    }

    /// Courses passing every predicate, in input order
    pub fn apply(&self, filters: &FilterState, courses: &[Course], active_collection: &str) -> Vec<Course> {
        self.apply_at(filters, courses, active_collection, Utc::now())
    }

    /// Same as `apply` with an explicit clock
    pub fn apply_at(
        &self,
        filters: &FilterState,
        courses: &[Course],
        active_collection: &str,
        now: DateTime<Utc>,
    ) -> Vec<Course> {
        let query = filters.search_query.trim().to_lowercase();
        courses
            .iter()
            .filter(|course| self.matches(filters, &query, course, active_collection, now))
            .cloned()
            .collect()
    }

    fn matches(
        &self,
        filters: &FilterState,
        query: &str,
        course: &Course,
        active_collection: &str,
        now: DateTime<Utc>,
    ) -> bool {
        self.in_scope(course, active_collection)
            && matches_search(filters, query, course)
            && matches_category(filters, course)
            && matches_credits(filters, course)
            && matches_designations(filters, course)
            && matches_status(filters, course)
            && filters.rating_filter.admits(course.rating)
            && self.matches_date(filters, course, now)
    }

    fn in_scope(&self, course: &Course, active_collection: &str) -> bool {
        self.all_courses_scopes.iter().any(|s| s == active_collection)
            || course.collection_ids.iter().any(|id| id == active_collection)
    }

    fn matches_date(&self, filters: &FilterState, course: &Course, now: DateTime<Utc>) -> bool {
        match filters.date_filter_type {
            DateFilter::All => true,
            DateFilter::SinceLogin => course.date >= now - self.since_login,
            DateFilter::ThisMonth => {
                course.date.year() == now.year() && course.date.month() == now.month()
            }
            DateFilter::LastXDays => course.date >= now - Duration::days(filters.custom_days()),
        }
    }
}

fn matches_search(filters: &FilterState, query: &str, course: &Course) -> bool {
    if query.is_empty() {
        return true;
    }
    let hit = |text: &str| text.to_lowercase().contains(query);
    hit(&course.title)
        || hit(&course.author)
        || hit(&course.description)
        || (filters.include_lessons && course.lessons.iter().any(|l| hit(&l.title)))
}

fn matches_category(filters: &FilterState, course: &Course) -> bool {
    filters.category == ALL_CATEGORIES || filters.category.is_empty() || filters.category == course.category
}

fn matches_credits(filters: &FilterState, course: &Course) -> bool {
    filters.credits.is_empty() || course.credits.iter().any(|c| filters.credits.contains(c))
}

fn matches_designations(filters: &FilterState, course: &Course) -> bool {
    if filters.designations.is_empty() {
        return true;
    }
    (filters.designations.contains(&Designation::Required) && course.required)
        || (filters.designations.contains(&Designation::Recommended) && course.saved)
}

fn matches_status(filters: &FilterState, course: &Course) -> bool {
    filters.status.is_empty() || filters.status.contains(&CompletionStatus::of(course.progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn engine() -> FilterEngine {
        FilterEngine::default()
    }

    fn ids(courses: &[Course]) -> Vec<&str> {
        courses.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_initial_filters_pass_everything() {
        let courses = vec![Course::new("a", "Tax Basics"), Course::new("b", "Ethics").rated(2.0)];
        let out = engine().apply(&FilterState::initial(), &courses, "academy");
        assert_eq!(out, courses);
    }

    #[test]
    fn test_category_exact_match_or_all() {
        let courses = vec![
            Course::new("a", "Lease Accounting").in_category("Accounting"),
            Course::new("b", "Professional Conduct").in_category("Ethics"),
            Course::new("c", "Accounting Ethics").in_category("accounting"),
        ];
        let mut filters = FilterState::initial();
        assert!(filters.is_initial());

        filters.category = "Accounting".into();
        assert!(!filters.is_initial());
        assert_eq!(ids(&engine().apply(&filters, &courses, "academy")), vec!["a"]);

        filters.category = "Tax".into();
        assert!(engine().apply(&filters, &courses, "academy").is_empty());

        filters.category = ALL_CATEGORIES.into();
        assert!(filters.is_initial());
        assert_eq!(engine().apply(&filters, &courses, "academy").len(), 3);
    }

    #[test]
    fn test_scope_requires_denormalized_membership() {
        let courses = vec![
            Course::new("a", "A").in_collections(&["fav"]),
            Course::new("b", "B"),
        ];
        let out = engine().apply(&FilterState::initial(), &courses, "fav");
        assert_eq!(ids(&out), vec!["a"]);
        let out = engine().apply(&FilterState::initial(), &courses, "dashboard");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_search_matches_author_case_insensitively() {
        let courses = vec![
            Course::new("a", "Audit").by("Jane Doe"),
            Course::new("b", "Payroll").with_lesson("l1", "Doe v. Smith"),
        ];
        let mut filters = FilterState::initial();
        filters.search_query = "DOE".into();
        assert_eq!(ids(&engine().apply(&filters, &courses, "academy")), vec!["a"]);

        filters.include_lessons = true;
        assert_eq!(ids(&engine().apply(&filters, &courses, "academy")), vec!["a", "b"]);
    }

    #[test]
    fn test_credits_use_or_semantics() {
        let courses = vec![
            Course::new("a", "A").with_credits(&["CPE"]),
            Course::new("b", "B").with_credits(&["CLE", "CFP"]),
            Course::new("c", "C"),
        ];
        let mut filters = FilterState::initial();
        filters.credits = ["CPE".to_string(), "CFP".to_string()].into_iter().collect();
        assert_eq!(ids(&engine().apply(&filters, &courses, "academy")), vec!["a", "b"]);
    }

    #[test]
    fn test_designations_are_ored() {
        let mut saved = Course::new("b", "B");
        saved.saved = true;
        let mut required = Course::new("a", "A");
        required.required = true;
        let courses = vec![required, saved, Course::new("c", "C")];

        let mut filters = FilterState::initial();
        filters.designations.insert(Designation::Recommended);
        assert_eq!(ids(&engine().apply(&filters, &courses, "academy")), vec!["b"]);
        filters.designations.insert(Designation::Required);
        assert_eq!(ids(&engine().apply(&filters, &courses, "academy")), vec!["a", "b"]);
    }

    #[test]
    fn test_status_buckets() {
        assert_eq!(CompletionStatus::of(0), CompletionStatus::NotStarted);
        assert_eq!(CompletionStatus::of(42), CompletionStatus::InProgress);
        assert_eq!(CompletionStatus::of(100), CompletionStatus::Completed);

        let courses = vec![
            Course::new("a", "A"),
            Course::new("b", "B").with_progress(50),
            Course::new("c", "C").with_progress(100),
        ];
        let mut filters = FilterState::initial();
        filters.status.insert(CompletionStatus::NotStarted);
        filters.status.insert(CompletionStatus::Completed);
        assert_eq!(ids(&engine().apply(&filters, &courses, "academy")), vec!["a", "c"]);
    }

    #[test]
    fn test_rating_buckets() {
        let courses = vec![
            Course::new("r0", "unrated"),
            Course::new("r3", "three").rated(3.0),
            Course::new("r4", "four").rated(4.0),
            Course::new("r5", "five").rated(5.0),
        ];
        let mut filters = FilterState::initial();
        filters.rating_filter = "4_PLUS".parse().unwrap();
        assert_eq!(ids(&engine().apply(&filters, &courses, "academy")), vec!["r4", "r5"]);
        filters.rating_filter = RatingFilter::NotRated;
        assert_eq!(ids(&engine().apply(&filters, &courses, "academy")), vec!["r0"]);
    }

    #[test]
    fn test_date_windows() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let courses = vec![
            Course::new("today", "T").dated(now),
            Course::new("five", "F").dated(now - Duration::days(5)),
            Course::new("ten", "X").dated(now - Duration::days(10)),
            Course::new("lastmonth", "L").dated(now - Duration::days(20)),
        ];
        let e = engine();
        let mut filters = FilterState::initial();

        filters.date_filter_type = DateFilter::LastXDays;
        filters.custom_days = "7".into();
        assert_eq!(ids(&e.apply_at(&filters, &courses, "academy", now)), vec!["today", "five"]);

        filters.custom_days = "soon".into();
        assert_eq!(ids(&e.apply_at(&filters, &courses, "academy", now)), vec!["today"]);

        filters.date_filter_type = DateFilter::SinceLogin;
        assert_eq!(ids(&e.apply_at(&filters, &courses, "academy", now)), vec!["today"]);

        filters.date_filter_type = DateFilter::ThisMonth;
        assert_eq!(
            ids(&e.apply_at(&filters, &courses, "academy", now)),
            vec!["today", "five", "ten"]
        );
    }

    #[test]
    fn test_rating_filter_serde_shape() {
        assert_eq!(RatingFilter::AtLeast(4).to_string(), "4_PLUS");
        let parsed: RatingFilter = serde_json::from_str("\"NOT_RATED\"").unwrap();
        assert_eq!(parsed, RatingFilter::NotRated);
        assert!("FIVE_STARS".parse::<RatingFilter>().is_err());
    }
}
