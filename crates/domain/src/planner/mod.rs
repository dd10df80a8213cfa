mod repair;

use crate::model::{MediaRef, PostType};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

pub use repair::sample_and_repair;

/// A single media pool entry. Multi-URL items arrive pre-grouped and become
/// a carousel.
#[derive(Debug, Clone)]
pub enum MediaItem {
    Image(String),
    Video(String),
    Carousel(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoMode {
    ReelFeed,
    ReelOnly,
}

/// `weekly_plan[d]` is the requested slot count for `Weekday::num_days_from_monday() == d`.
pub type WeeklyPlan = [u8; 7];

pub struct PlannerInput {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekly_plan: WeeklyPlan,
    pub timezone: Tz,
    /// Minutes-since-midnight bounds of the randomization window.
    pub random_start_minute: u32,
    pub random_end_minute: u32,
    pub min_spacing_minutes: i64,
    pub media_pool: Vec<MediaItem>,
    pub video_mode: VideoMode,
    pub override_spacing: bool,
    /// Minute-of-day offsets of already-scheduled, non-terminal posts per
    /// local date, supplied by the caller (`crates/store`'s range query).
    pub existing_local_minutes: HashMap<NaiveDate, Vec<i64>>,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct PlannedSlot {
    pub local_date: NaiveDate,
    pub scheduled_at: DateTime<Utc>,
    pub media: MediaRef,
    pub post_type: PostType,
}

#[derive(Debug, Clone)]
pub struct DayConflict {
    pub date: NaiveDate,
    pub requested: u8,
    pub scheduled: u8,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PlannerOutput {
    pub slots: Vec<PlannedSlot>,
    pub conflicts: Vec<DayConflict>,
    pub insufficient_media: bool,
}

fn media_item_to_slot(item: &MediaItem, video_mode: VideoMode) -> (MediaRef, PostType) {
    match item {
        MediaItem::Image(url) => (MediaRef::Single { url: url.clone() }, PostType::Photo),
        MediaItem::Video(url) => {
            let post_type = match video_mode {
                VideoMode::ReelFeed => PostType::ReelFeed,
                VideoMode::ReelOnly => PostType::ReelOnly,
            };
            (MediaRef::Single { url: url.clone() }, post_type)
        }
        MediaItem::Carousel(urls) => (
            MediaRef::Carousel {
                urls: urls.clone(),
            },
            PostType::Carousel,
        ),
    }
}

/// Deterministic given `seed`. Pure beyond the RNG it seeds internally — no
/// clock reads, no I/O. `apps/api`'s preflight handler calls this directly;
/// commit re-calls it with the same seed so the committed posts match what
/// preflight previewed.
pub fn plan(input: PlannerInput) -> PlannerOutput {
    let mut rng = StdRng::seed_from_u64(input.seed);
    let mut media_pool = input.media_pool.iter();
    let mut slots = Vec::new();
    let mut conflicts = Vec::new();
    let mut insufficient_media = false;

    let mut date = input.start_date;
    while date <= input.end_date {
        let weekday_idx = date.weekday().num_days_from_monday() as usize;
        let requested = input.weekly_plan[weekday_idx].min(15);

        if requested > 0 {
            let existing = input
                .existing_local_minutes
                .get(&date)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let anchors = if input.override_spacing { &[][..] } else { existing };

            let (offsets, dropped) = sample_and_repair(
                &mut rng,
                requested as usize,
                input.random_start_minute,
                input.random_end_minute,
                input.min_spacing_minutes,
                anchors,
            );

            if dropped > 0 {
                conflicts.push(DayConflict {
                    date,
                    requested,
                    scheduled: offsets.len() as u8,
                    reason: format!(
                        "{dropped} slot(s) dropped: could not satisfy {}-minute spacing within the randomization window",
                        input.min_spacing_minutes
                    ),
                });
            }

            for offset in offsets {
                let Some(item) = media_pool.next() else {
                    insufficient_media = true;
                    break;
                };
                let (media, post_type) = media_item_to_slot(item, input.video_mode);
                let time = NaiveTime::from_hms_opt(0, 0, 0).unwrap()
                    + chrono::Duration::minutes(offset);
                let naive = date.and_time(time);
                let local = match input.timezone.from_local_datetime(&naive) {
                    chrono::LocalResult::Single(dt) => dt,
                    chrono::LocalResult::Ambiguous(dt, _) => dt,
                    chrono::LocalResult::None => continue,
                };
                slots.push(PlannedSlot {
                    local_date: date,
                    scheduled_at: local.with_timezone(&Utc),
                    media,
                    post_type,
                });
            }
        }

        date = date.succ_opt().expect("date range within chrono's representable span");
    }

    PlannerOutput {
        slots,
        conflicts,
        insufficient_media,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn input(seed: u64, override_spacing: bool) -> PlannerInput {
        let mut weekly_plan = [0u8; 7];
        weekly_plan[0] = 3; // Monday
        weekly_plan[1] = 3; // Tuesday
        weekly_plan[2] = 3; // Wednesday
        weekly_plan[3] = 3; // Thursday
        weekly_plan[4] = 3; // Friday
        weekly_plan[5] = 1; // Saturday
        weekly_plan[6] = 0; // Sunday
        PlannerInput {
            start_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 8).unwrap(),
            weekly_plan,
            timezone: chrono_tz::America::New_York,
            random_start_minute: 9 * 60,
            random_end_minute: 21 * 60,
            min_spacing_minutes: 15,
            media_pool: (0..18)
                .map(|i| MediaItem::Image(format!("https://x/{i}.jpg")))
                .collect(),
            video_mode: VideoMode::ReelFeed,
            override_spacing,
            existing_local_minutes: HashMap::new(),
            seed,
        }
    }

    #[test]
    fn same_seed_produces_identical_output() {
        let a = plan(input(42, false));
        let b = plan(input(42, false));
        assert_eq!(a.slots.len(), b.slots.len());
        for (sa, sb) in a.slots.iter().zip(b.slots.iter()) {
            assert_eq!(sa.scheduled_at, sb.scheduled_at);
        }
    }

    #[test]
    fn weekly_plan_totals_sixteen_slots_over_the_week() {
        let out = plan(input(7, false));
        assert_eq!(out.slots.len(), 16);
        assert!(!out.insufficient_media);
    }

    #[test]
    fn all_slots_on_a_day_satisfy_minimum_spacing() {
        let out = plan(input(7, false));
        let mut by_day: HashMap<NaiveDate, Vec<DateTime<Utc>>> = HashMap::new();
        for slot in &out.slots {
            by_day.entry(slot.local_date).or_default().push(slot.scheduled_at);
        }
        for times in by_day.values() {
            let mut sorted = times.clone();
            sorted.sort();
            for w in sorted.windows(2) {
                let gap = w[1] - w[0];
                assert!(gap >= chrono::Duration::minutes(15));
            }
        }
    }

    #[test]
    fn insufficient_media_pool_is_flagged() {
        let mut i = input(7, false);
        i.media_pool.truncate(5);
        let out = plan(i);
        assert!(out.insufficient_media);
    }
}
