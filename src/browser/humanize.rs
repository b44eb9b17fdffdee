//! Humanized pointer and scroll input
//!
//! Plan construction (`trajectory`, `scroll_plan`) is pure and separated from
//! the async drivers that replay a plan against a page. Timing values are
//! advisory; none of these routines retry.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::Page;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::BrowserError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Closed-form cubic Bezier (Bernstein basis).
fn bezier(t: f64, p0: Point, p1: Point, p2: Point, p3: Point) -> Point {
    let mt = 1.0 - t;
    Point {
        x: mt.powi(3) * p0.x
            + 3.0 * mt.powi(2) * t * p1.x
            + 3.0 * mt * t.powi(2) * p2.x
            + t.powi(3) * p3.x,
        y: mt.powi(3) * p0.y
            + 3.0 * mt.powi(2) * t * p1.y
            + 3.0 * mt * t.powi(2) * p2.y
            + t.powi(3) * p3.y,
    }
}

/// Build a pointer path from `start` to `target`: a cubic Bezier through two
/// randomized control points, sampled at 20-40 uniform steps. The path always
/// ends exactly on `target`.
pub fn trajectory(start: Point, target: Point, rng: &mut impl Rng) -> Vec<Point> {
    let control1 = Point {
        x: start.x + rng.gen_range(50.0..=200.0),
        y: start.y + rng.gen_range(-100.0..=100.0),
    };
    let control2 = Point {
        x: target.x - rng.gen_range(50.0..=200.0),
        y: target.y + rng.gen_range(-100.0..=100.0),
    };

    let steps = rng.gen_range(20..=40);
    (0..=steps)
        .map(|i| bezier(i as f64 / steps as f64, start, control1, control2, target))
        .collect()
}

/// Build a scroll plan for a page of `scroll_height` px: cumulative offsets in
/// 50-200px increments up to a target uniformly within 30-90% of the height.
pub fn scroll_plan(scroll_height: i64, rng: &mut impl Rng) -> Vec<i64> {
    if scroll_height <= 0 {
        return Vec::new();
    }

    let low = (scroll_height as f64 * 0.3) as i64;
    let high = (scroll_height as f64 * 0.9) as i64;
    let target = if low < high { rng.gen_range(low..=high) } else { high };

    let mut offsets = Vec::new();
    let mut current = 0i64;
    while current < target {
        current = (current + rng.gen_range(50..=200)).min(target);
        offsets.push(current);
    }
    offsets
}

/// Move the pointer to `target` along a humanized trajectory, pacing each step
/// by 10-30ms. The start point is randomized within the first 100x100px region.
pub async fn mouse_move(page: &Page, target: Point) -> Result<(), BrowserError> {
    let mut rng = StdRng::from_entropy();
    let start = Point {
        x: rng.gen_range(0.0..=100.0),
        y: rng.gen_range(0.0..=100.0),
    };
    let path = trajectory(start, target, &mut rng);

    for point in path {
        let event = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(point.x)
            .y(point.y)
            .button(MouseButton::None)
            .build()
            .unwrap();
        page.execute(event)
            .await
            .map_err(|e| BrowserError::JavaScriptError(format!("mouse move failed: {e}")))?;

        tokio::time::sleep(Duration::from_millis(rng.gen_range(10..=30))).await;
    }

    Ok(())
}

/// Move to `target` and click it: randomized pre-click delay (0.2-0.8s), press,
/// 50-100ms hold, release, then a 1.0-2.5s post-click pause.
pub async fn click_at(page: &Page, target: Point) -> Result<(), BrowserError> {
    mouse_move(page, target).await?;

    let mut rng = StdRng::from_entropy();
    tokio::time::sleep(Duration::from_millis(rng.gen_range(200..=800))).await;

    let press = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MousePressed)
        .x(target.x)
        .y(target.y)
        .button(MouseButton::Left)
        .click_count(1)
        .build()
        .unwrap();
    page.execute(press)
        .await
        .map_err(|e| BrowserError::JavaScriptError(format!("mouse press failed: {e}")))?;

    tokio::time::sleep(Duration::from_millis(rng.gen_range(50..=100))).await;

    let release = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MouseReleased)
        .x(target.x)
        .y(target.y)
        .button(MouseButton::Left)
        .click_count(1)
        .build()
        .unwrap();
    page.execute(release)
        .await
        .map_err(|e| BrowserError::JavaScriptError(format!("mouse release failed: {e}")))?;

    tokio::time::sleep(Duration::from_millis(rng.gen_range(1000..=2500))).await;

    Ok(())
}

/// Scroll the page toward a random 30-90% depth in humanized increments with
/// 0.1-0.5s pacing, then dwell 0.8-3.2s.
pub async fn scroll(page: &Page) -> Result<(), BrowserError> {
    let height: i64 = page
        .evaluate("document.body.scrollHeight")
        .await
        .map_err(|e| BrowserError::JavaScriptError(format!("scroll height read failed: {e}")))?
        .into_value()
        .unwrap_or(0);

    let mut rng = StdRng::from_entropy();
    let plan = scroll_plan(height, &mut rng);

    for offset in plan {
        page.evaluate(format!("window.scrollTo(0, {offset})"))
            .await
            .map_err(|e| BrowserError::JavaScriptError(format!("scroll failed: {e}")))?;
        tokio::time::sleep(Duration::from_millis(rng.gen_range(100..=500))).await;
    }

    tokio::time::sleep(Duration::from_millis(rng.gen_range(800..=3200))).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn trajectory_ends_on_target_with_bounded_steps() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let target = Point::new(rng.gen_range(200.0..1800.0), rng.gen_range(200.0..900.0));
            let path = trajectory(Point::new(10.0, 10.0), target, &mut rng);

            // 20-40 steps means 21-41 sampled points
            assert!(path.len() >= 21 && path.len() <= 41, "len = {}", path.len());

            let last = path.last().unwrap();
            assert!((last.x - target.x).abs() < 1e-6);
            assert!((last.y - target.y).abs() < 1e-6);
        }
    }

    #[test]
    fn scroll_plan_is_monotonic_and_bounded() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let height = rng.gen_range(500..20_000);
            let plan = scroll_plan(height, &mut rng);
            assert!(!plan.is_empty());

            let mut previous = 0;
            for (i, offset) in plan.iter().enumerate() {
                assert!(*offset > previous, "offsets must strictly advance");
                if i + 1 < plan.len() {
                    assert!(*offset - previous <= 200, "increment too large");
                    assert!(*offset - previous >= 50, "increment too small");
                }
                previous = *offset;
            }

            let target = *plan.last().unwrap();
            assert!(target >= (height as f64 * 0.3) as i64);
            assert!(target <= (height as f64 * 0.9) as i64);
        }
    }

    #[test]
    fn scroll_plan_empty_for_flat_page() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(scroll_plan(0, &mut rng).is_empty());
        assert!(scroll_plan(-10, &mut rng).is_empty());
    }
}
