//! Applying plans to the live page.
//!
//! Every action is isolated: its failure is returned as an [`ActionError`]
//! and the runner moves on to the next one, so one stale selector cannot
//! keep the remaining fields or the final submit from being attempted.

use crate::dom;
use crate::errors::{ActionError, PageError};
use crate::page::Page;
use crate::types::{Action, ActionPlan, Timings};

/// How an action ended up being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Clicked,
    Filled,
    /// Filled on the second attempt after a transient failure.
    FilledOnRetry,
    SelectedByLabel,
    SelectedByValue,
}

pub type ActionResult = Result<Applied, ActionError>;

/// Applies single actions with control-type disambiguation.
#[derive(Debug, Clone, Copy)]
pub struct ActionExecutor {
    timings: Timings,
}

impl ActionExecutor {
    pub fn new(timings: Timings) -> Self {
        Self { timings }
    }

    /// Apply one action, then wait out the settle interval.
    pub async fn execute<P: Page + ?Sized>(&self, page: &P, action: &Action) -> ActionResult {
        tracing::info!(%action, "executing");

        if let Err(e) = page.evaluate(&dom::highlight_script(action.selector())).await {
            tracing::debug!(selector = action.selector(), error = %e, "highlight failed");
        }

        let result = match action {
            Action::Click { selector } => page
                .click(selector)
                .await
                .map(|()| Applied::Clicked)
                .map_err(|source| ActionError::Click {
                    selector: selector.clone(),
                    source,
                }),
            Action::Fill { selector, value } => self.fill(page, selector, value).await,
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, "action failed");
        }

        tokio::time::sleep(self.timings.settle).await;
        result
    }

    async fn fill<P: Page + ?Sized>(&self, page: &P, selector: &str, value: &str) -> ActionResult {
        let tag = match page.tag_name(selector, self.timings.probe_timeout).await {
            Ok(tag) => Some(tag),
            Err(e) => {
                tracing::debug!(selector, error = %e, "tag probe failed, filling directly");
                None
            }
        };

        match tag.as_deref() {
            Some(t) if t.eq_ignore_ascii_case("select") => select(page, selector, value).await,
            Some(_) => match page.fill(selector, value).await {
                Ok(()) => Ok(Applied::Filled),
                Err(e) if e.is_not_fillable() => Err(fill_error(selector, e)),
                Err(e) => {
                    tracing::debug!(selector, error = %e, "fill failed, retrying once");
                    page.fill(selector, value)
                        .await
                        .map(|()| Applied::FilledOnRetry)
                        .map_err(|e| fill_error(selector, e))
                }
            },
            None => page
                .fill(selector, value)
                .await
                .map(|()| Applied::Filled)
                .map_err(|e| fill_error(selector, e)),
        }
    }
}

async fn select<P: Page + ?Sized>(page: &P, selector: &str, text: &str) -> ActionResult {
    let by_label = match page.select_option_by_label(selector, text).await {
        Ok(()) => return Ok(Applied::SelectedByLabel),
        Err(e) => e,
    };
    tracing::debug!(selector, error = %by_label, "no option with that label, trying by value");
    match page.select_option_by_value(selector, text).await {
        Ok(()) => Ok(Applied::SelectedByValue),
        Err(by_value) => Err(ActionError::Select {
            selector: selector.to_string(),
            by_label,
            by_value,
        }),
    }
}

fn fill_error(selector: &str, source: PageError) -> ActionError {
    ActionError::Fill {
        selector: selector.to_string(),
        source,
    }
}

/// Result of one action within a plan.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action: Action,
    pub result: ActionResult,
}

/// Outcomes of a whole plan, in execution order.
#[derive(Debug, Clone, Default)]
pub struct PlanReport {
    pub outcomes: Vec<ActionOutcome>,
}

impl PlanReport {
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }
}

/// Runs a plan front to back through an [`ActionExecutor`].
#[derive(Debug, Clone, Copy)]
pub struct PlanRunner {
    executor: ActionExecutor,
    timings: Timings,
}

impl PlanRunner {
    pub fn new(timings: Timings) -> Self {
        Self {
            executor: ActionExecutor::new(timings),
            timings,
        }
    }

    /// Every action is attempted regardless of earlier failures; the
    /// cooldown afterwards gives a final submit time to land.
    pub async fn run<P: Page + ?Sized>(&self, page: &P, plan: &ActionPlan) -> PlanReport {
        let mut report = PlanReport::default();
        for action in plan {
            let result = self.executor.execute(page, action).await;
            report.outcomes.push(ActionOutcome {
                action: action.clone(),
                result,
            });
        }

        tracing::info!(
            applied = report.applied(),
            total = plan.len(),
            "plan finished, waiting for submission to settle"
        );
        tokio::time::sleep(self.timings.cooldown).await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::testing::ScriptedPage;

    fn runner() -> PlanRunner {
        PlanRunner::new(Timings::ZERO)
    }

    fn executor() -> ActionExecutor {
        ActionExecutor::new(Timings::ZERO)
    }

    #[tokio::test]
    async fn click_applies() {
        let page = ScriptedPage::default().with_element("#submit", "BUTTON");
        let result = executor().execute(&page, &Action::click("#submit")).await;
        assert!(matches!(result, Ok(Applied::Clicked)));
        assert_eq!(page.value_of("#submit").as_deref(), Some("clicked"));
    }

    #[tokio::test]
    async fn click_on_missing_element_is_an_error_not_a_panic() {
        let page = ScriptedPage::default();
        let result = executor().execute(&page, &Action::click("#gone")).await;
        assert!(matches!(result, Err(ActionError::Click { .. })));
    }

    #[tokio::test]
    async fn text_input_is_filled() {
        let page = ScriptedPage::default().with_element("#email", "INPUT");
        let result = executor()
            .execute(&page, &Action::fill("#email", "ada@example.com"))
            .await;
        assert!(matches!(result, Ok(Applied::Filled)));
        assert_eq!(page.value_of("#email").as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn select_by_label_skips_value_lookup() {
        let page = ScriptedPage::default()
            .with_select("#country", &[("United Kingdom", "uk"), ("France", "fr")]);
        let result = executor()
            .execute(&page, &Action::fill("#country", "United Kingdom"))
            .await;
        assert!(matches!(result, Ok(Applied::SelectedByLabel)));
        assert_eq!(page.value_of("#country").as_deref(), Some("uk"));
        assert!(!page.calls().iter().any(|c| c.starts_with("select_value")));
        assert!(!page.calls().iter().any(|c| c.starts_with("fill")));
    }

    #[tokio::test]
    async fn select_falls_back_to_value() {
        let page = ScriptedPage::default()
            .with_select("#country", &[("United Kingdom", "uk"), ("France", "fr")]);
        let result = executor().execute(&page, &Action::fill("#country", "fr")).await;
        assert!(matches!(result, Ok(Applied::SelectedByValue)));
        assert_eq!(page.value_of("#country").as_deref(), Some("fr"));
        let calls = page.calls();
        let label = calls.iter().position(|c| c == "select_label #country=fr").unwrap();
        let value = calls.iter().position(|c| c == "select_value #country=fr").unwrap();
        assert!(label < value);
    }

    #[tokio::test]
    async fn select_with_no_matching_option_reports_both_attempts() {
        let page = ScriptedPage::default().with_select("#country", &[("France", "fr")]);
        let result = executor().execute(&page, &Action::fill("#country", "Narnia")).await;
        match result {
            Err(ActionError::Select {
                by_label, by_value, ..
            }) => {
                assert!(matches!(by_label, PageError::NoOption(..)));
                assert!(matches!(by_value, PageError::NoOption(..)));
            }
            other => panic!("expected select error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_fillable_is_not_retried() {
        let page = ScriptedPage::default().with_element("#terms", "DIV");
        let result = executor().execute(&page, &Action::fill("#terms", "yes")).await;
        assert!(matches!(result, Err(ActionError::Fill { .. })));
        let fills = page.calls().iter().filter(|c| c.starts_with("fill")).count();
        assert_eq!(fills, 1);
    }

    #[tokio::test]
    async fn transient_fill_failure_is_retried_once() {
        let mut page = ScriptedPage::default().with_element("#city", "INPUT");
        page.flaky_fill.insert("#city".into());
        let result = executor().execute(&page, &Action::fill("#city", "Paris")).await;
        assert!(matches!(result, Ok(Applied::FilledOnRetry)));
        assert_eq!(page.value_of("#city").as_deref(), Some("Paris"));
    }

    #[tokio::test]
    async fn probe_timeout_falls_through_to_direct_fill() {
        let mut page = ScriptedPage::default().with_element("#slow", "INPUT");
        page.slow_probe.insert("#slow".into());
        let result = executor().execute(&page, &Action::fill("#slow", "x")).await;
        assert!(matches!(result, Ok(Applied::Filled)));
    }

    #[tokio::test]
    async fn fill_on_missing_element_fails_safely() {
        let page = ScriptedPage::default();
        let result = executor().execute(&page, &Action::fill("#nowhere", "x")).await;
        match result {
            Err(ActionError::Fill { source, .. }) => {
                assert!(matches!(source, PageError::NotFound(_)))
            }
            other => panic!("expected fill error, got {other:?}"),
        }
        let fills = page.calls().iter().filter(|c| c.starts_with("fill")).count();
        assert_eq!(fills, 1);
    }

    #[tokio::test]
    async fn failed_middle_action_does_not_stop_the_plan() {
        let page = ScriptedPage::default()
            .with_element("#first", "INPUT")
            .with_element("#submit", "BUTTON");
        let plan = ActionPlan::from(vec![
            Action::fill("#first", "Ada"),
            Action::fill("#missing", "Lovelace"),
            Action::click("#submit"),
        ]);

        let report = runner().run(&page, &plan).await;

        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes[0].result.is_ok());
        assert!(report.outcomes[1].result.is_err());
        assert!(report.outcomes[2].result.is_ok());
        assert_eq!(report.applied(), 2);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(page.value_of("#first").as_deref(), Some("Ada"));
        assert_eq!(page.value_of("#submit").as_deref(), Some("clicked"));
    }

    #[tokio::test]
    async fn actions_run_in_plan_order() {
        let page = ScriptedPage::default()
            .with_element("#a", "INPUT")
            .with_element("#b", "TEXTAREA")
            .with_element("#go", "BUTTON");
        let plan = ActionPlan::from(vec![
            Action::fill("#b", "2"),
            Action::fill("#a", "1"),
            Action::click("#go"),
        ]);
        runner().run(&page, &plan).await;

        let effects: Vec<String> = page
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("fill") || c.starts_with("click"))
            .collect();
        assert_eq!(effects, ["fill #b=2", "fill #a=1", "click #go"]);
    }

    #[tokio::test]
    async fn failed_highlight_does_not_block_the_action() {
        let mut page = ScriptedPage::default().with_element("#email", "INPUT");
        page.fail_evaluate = true;
        let result = executor()
            .execute(&page, &Action::fill("#email", "ada@example.com"))
            .await;
        assert!(matches!(result, Ok(Applied::Filled)));
        assert_eq!(page.value_of("#email").as_deref(), Some("ada@example.com"));
        assert_eq!(page.calls()[0], "evaluate");
    }

    #[tokio::test(start_paused = true)]
    async fn settle_follows_every_action() {
        let timings = Timings::default();
        let page = ScriptedPage::default().with_element("#go", "BUTTON");

        let start = tokio::time::Instant::now();
        let ok = ActionExecutor::new(timings).execute(&page, &Action::click("#go")).await;
        assert!(ok.is_ok());
        assert_eq!(start.elapsed(), timings.settle);

        let start = tokio::time::Instant::now();
        let failed = ActionExecutor::new(timings).execute(&page, &Action::click("#gone")).await;
        assert!(failed.is_err());
        assert_eq!(start.elapsed(), timings.settle);
    }

    #[tokio::test(start_paused = true)]
    async fn plan_waits_settle_per_action_then_cooldown() {
        let timings = Timings::default();
        let page = ScriptedPage::default().with_element("#first", "INPUT");
        let plan = ActionPlan::from(vec![
            Action::fill("#first", "Ada"),
            Action::click("#missing"),
        ]);

        let start = tokio::time::Instant::now();
        let report = PlanRunner::new(timings).run(&page, &plan).await;

        assert_eq!(report.applied(), 1);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(start.elapsed(), timings.settle * 2 + timings.cooldown);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_plan_still_cools_down() {
        let timings = Timings::default();
        let page = ScriptedPage::default();
        let start = tokio::time::Instant::now();
        PlanRunner::new(timings).run(&page, &ActionPlan::empty()).await;
        assert_eq!(start.elapsed(), timings.cooldown);
    }

    #[tokio::test]
    async fn empty_plan_is_a_no_op() {
        let page = ScriptedPage::default();
        let report = runner().run(&page, &ActionPlan::empty()).await;
        assert!(report.outcomes.is_empty());
        assert!(page.calls().is_empty());
    }
}
