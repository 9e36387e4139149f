//! Budget Gate (C4): pre-flight admission (`register_call`) and post-flight
//! finalization (`update_call`), backed by one `BudgetScopeActor` per scope.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Utc};
use kameo::actor::ActorRef;
use tokio::sync::Mutex;
use uuid::Uuid;

use platform_domain::{
    AICall, BudgetAlert, BudgetScope, RegisterCallRequest, RegisterCallResponse, UpdateCallRequest,
    UpdateBudgetConfigRequest, UsageStats, UsageStatsQuery,
};
use platform_storage::BudgetRepository;

use crate::actor::{BudgetScopeActor, Commit, Release, Reserve};
use crate::error::GateError;
use crate::pricing::PricingTable;

/// One `(since, until)` window per budget period, anchored to UTC day/week/month
/// boundaries per spec §4.3.
struct Windows {
    day: (DateTime<Utc>, DateTime<Utc>),
    week: (DateTime<Utc>, DateTime<Utc>),
    month: (DateTime<Utc>, DateTime<Utc>),
}

fn windows(now: DateTime<Utc>) -> Windows {
    let day_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
    let week_start = day_start - Duration::days(now.weekday().num_days_from_monday() as i64);
    let (next_month_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let month_start = now
        .date_naive()
        .with_day(1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();
    let month_end = chrono::NaiveDate::from_ymd_opt(next_month_year, next_month, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();

    Windows {
        day: (day_start, day_start + Duration::days(1)),
        week: (week_start, week_start + Duration::weeks(1)),
        month: (month_start, month_end),
    }
}

pub struct BudgetGate {
    repository: BudgetRepository,
    actors: Mutex<HashMap<String, ActorRef<BudgetScopeActor>>>,
}

impl BudgetGate {
    pub fn new(repository: BudgetRepository) -> Self {
        Self {
            repository,
            actors: Mutex::new(HashMap::new()),
        }
    }

    async fn actor_for(&self, scope_key: &str) -> ActorRef<BudgetScopeActor> {
        let mut actors = self.actors.lock().await;
        actors
            .entry(scope_key.to_string())
            .or_insert_with(|| kameo::spawn(BudgetScopeActor::new(scope_key)))
            .clone()
    }

    /// Pre-flight admission. Reserves an estimate (priced from `prompt_tokens`
    /// alone — completion cost isn't known until `update_call`) against the
    /// user's daily limit, the provider's daily limit if configured, and the
    /// global daily budget, checked most-specific-first (user, provider,
    /// global) so a request that violates more than one ceiling at once
    /// reports the most specific violation per spec §4.4 step 4. A replayed
    /// `call_id` is rejected outright per spec §4.4 step 1 — admission is not
    /// idempotent, unlike the worker's content writes (spec §7).
    pub async fn register_call(
        &self,
        request: RegisterCallRequest,
        user_id: Uuid,
    ) -> Result<RegisterCallResponse, GateError> {
        if self.repository.get_call(request.call_id).await?.is_some() {
            return Err(GateError::DuplicateCall(request.call_id));
        }

        let config = self.repository.get_config().await?;
        let pricing = PricingTable::with_overrides(&config.custom_model_prices);
        let (input_cost, _, _) = pricing.cost(&request.model_name, request.prompt_tokens, 0);
        // Completion tokens aren't known until `update_call`; assume a 1.5x
        // completion-to-prompt ratio for the pre-flight reservation estimate.
        let price = pricing.price_for(&request.model_name);
        let prompt_k = request.prompt_tokens as f64 / 1000.0;
        let estimate = prompt_k * price.input + 1.5 * prompt_k * price.output;

        let now = Utc::now();
        let w = windows(now);

        // Weekly/monthly ceilings are checked directly against the ledger,
        // without an actor reservation — looser windows than the daily
        // check below, so the tighter bound is what actually needs
        // cross-request serialization.
        let week_used = self.repository.calculate_usage(w.week.0, w.week.1, None, None).await?;
        if week_used + estimate > config.weekly_budget {
            return Err(GateError::DailyBudgetExceeded {
                used: week_used,
                estimate,
                limit: config.weekly_budget,
            });
        }
        let month_used = self.repository.calculate_usage(w.month.0, w.month.1, None, None).await?;
        if month_used + estimate > config.monthly_budget {
            return Err(GateError::DailyBudgetExceeded {
                used: month_used,
                estimate,
                limit: config.monthly_budget,
            });
        }

        // Most-specific-first: user, then provider, then global. Whichever
        // scope fails first is the one reported, so a request that would
        // overrun both e.g. the user ceiling and the global one surfaces the
        // user-specific error rather than the global one.
        let user_used = self
            .repository
            .calculate_usage(w.day.0, w.day.1, None, Some(user_id))
            .await?;
        self.reserve_scope(
            &format!("user:{user_id}"),
            user_used,
            estimate,
            config.user_daily_limit,
            move |used, estimate, limit| GateError::UserBudgetExceeded { user_id, used, estimate, limit },
        )
        .await?;

        if let Some(limits) = config.provider_limits.get(&request.provider) {
            let provider_used = self
                .repository
                .calculate_usage(w.day.0, w.day.1, Some(&request.provider), None)
                .await?;
            let provider = request.provider.clone();
            if let Err(err) = self
                .reserve_scope(
                    &format!("provider:{}", request.provider),
                    provider_used,
                    estimate,
                    limits.daily,
                    move |used, estimate, limit| GateError::ProviderBudgetExceeded {
                        provider: provider.clone(),
                        used,
                        estimate,
                        limit,
                    },
                )
                .await
            {
                self.release_scope(&format!("user:{user_id}"), estimate).await;
                return Err(err);
            }
        }

        let global_used = self.repository.calculate_usage(w.day.0, w.day.1, None, None).await?;
        if let Err(err) = self
            .reserve_scope("global", global_used, estimate, config.daily_budget, |used, estimate, limit| {
                GateError::DailyBudgetExceeded { used, estimate, limit }
            })
            .await
        {
            self.release_scope(&format!("user:{user_id}"), estimate).await;
            if config.provider_limits.contains_key(&request.provider) {
                self.release_scope(&format!("provider:{}", request.provider), estimate).await;
            }
            return Err(err);
        }

        let call = self
            .repository
            .insert_inflight(
                request.call_id,
                &request.provider,
                &request.model_name,
                user_id,
                &request.feature,
                request.prompt_tokens,
                input_cost,
            )
            .await?;

        Ok(RegisterCallResponse { call_id: call.call_id })
    }

    async fn reserve_scope(
        &self,
        scope_key: &str,
        used: f64,
        estimate: f64,
        limit: f64,
        to_error: impl FnOnce(f64, f64, f64) -> GateError,
    ) -> Result<(), GateError> {
        let actor = self.actor_for(scope_key).await;
        let limit_remaining = limit - used;
        actor
            .ask(Reserve {
                estimate,
                limit_remaining,
            })
            .await
            .map_err(|_| to_error(used, estimate, limit))?
            .map_err(|_| to_error(used, estimate, limit))
    }

    async fn release_scope(&self, scope_key: &str, estimate: f64) {
        let actor = self.actor_for(scope_key).await;
        let _ = actor.ask(Release { estimate }).await;
    }

    async fn commit_scope(&self, scope_key: &str, estimate: f64) {
        let actor = self.actor_for(scope_key).await;
        let _ = actor.ask(Commit { estimate }).await;
    }

    /// Post-flight finalization. Recomputes cost authoritatively from
    /// `completion_tokens`, releases the actor reservations for the real
    /// estimate taken at `register_call`, and fires threshold alerts.
    pub async fn update_call(
        &self,
        call_id: Uuid,
        update: UpdateCallRequest,
    ) -> Result<AICall, GateError> {
        let existing = self
            .repository
            .get_call(call_id)
            .await?
            .ok_or(GateError::CallNotFound(call_id))?;

        let config = self.repository.get_config().await?;
        let pricing = PricingTable::with_overrides(&config.custom_model_prices);
        let (_, output_cost, _) = pricing.cost(&existing.model_name, 0, update.completion_tokens);
        let total_cost = existing.input_cost + output_cost;
        let estimate = existing.input_cost;

        let call = self
            .repository
            .finalize_call(
                call_id,
                update.completion_tokens,
                existing.prompt_tokens + update.completion_tokens,
                output_cost,
                total_cost,
                update.response_time_ms,
                update.success,
                update.error_message.as_deref(),
            )
            .await?;

        self.commit_scope("global", estimate).await;
        if config.provider_limits.contains_key(&existing.provider) {
            self.commit_scope(&format!("provider:{}", existing.provider), estimate).await;
        }
        self.commit_scope(&format!("user:{}", existing.user_id), estimate).await;

        if update.success {
            self.check_alerts(&config, &existing.provider, existing.user_id).await?;
        }

        Ok(call)
    }

    /// Checks daily usage against each configured threshold fraction, for the
    /// global scope plus the provider and user scopes touched by this call,
    /// and inserts an alert for every threshold crossed that doesn't already
    /// have one today — the unique index makes a concurrent second insert a
    /// harmless duplicate-key.
    async fn check_alerts(
        &self,
        config: &platform_domain::BudgetConfig,
        provider: &str,
        user_id: Uuid,
    ) -> Result<(), GateError> {
        let now = Utc::now();
        let w = windows(now);

        let global_used = self.repository.calculate_usage(w.day.0, w.day.1, None, None).await?;
        self.check_scope_alerts(BudgetScope::Global, global_used, config.daily_budget, &config.alert_thresholds, None, None)
            .await;

        if let Some(limits) = config.provider_limits.get(provider) {
            let provider_used = self
                .repository
                .calculate_usage(w.day.0, w.day.1, Some(provider), None)
                .await?;
            self.check_scope_alerts(
                BudgetScope::Provider,
                provider_used,
                limits.daily,
                &config.alert_thresholds,
                Some(provider),
                None,
            )
            .await;
        }

        let user_used = self.repository.calculate_usage(w.day.0, w.day.1, None, Some(user_id)).await?;
        self.check_scope_alerts(
            BudgetScope::User,
            user_used,
            config.user_daily_limit,
            &config.alert_thresholds,
            None,
            Some(user_id),
        )
        .await;

        Ok(())
    }

    async fn check_scope_alerts(
        &self,
        scope: BudgetScope,
        used: f64,
        limit: f64,
        thresholds: &[f64],
        provider: Option<&str>,
        user_id: Option<Uuid>,
    ) {
        let fraction = if limit > 0.0 { used / limit } else { 0.0 };
        for threshold in thresholds {
            if fraction >= *threshold {
                let _ = self
                    .repository
                    .insert_alert(scope, *threshold, used, provider, user_id)
                    .await;
            }
        }
    }

    pub async fn usage_stats(&self, query: UsageStatsQuery) -> Result<UsageStats, GateError> {
        let until = query.until.unwrap_or_else(Utc::now);
        let since = query.since.unwrap_or(until - Duration::days(30));
        Ok(self
            .repository
            .usage_stats(since, until, query.provider.as_deref(), query.user_id, query.feature.as_deref())
            .await?)
    }

    pub async fn update_config(
        &self,
        patch: UpdateBudgetConfigRequest,
    ) -> Result<platform_domain::BudgetConfig, GateError> {
        Ok(self.repository.update_config(patch).await?)
    }

    pub async fn register_model_price(
        &self,
        model_name: &str,
        price: platform_domain::ModelPrice,
    ) -> Result<platform_domain::BudgetConfig, GateError> {
        Ok(self.repository.register_model_price(model_name, price).await?)
    }

    pub async fn list_alerts(&self, include_dismissed: bool) -> Result<Vec<BudgetAlert>, GateError> {
        Ok(self.repository.list_alerts(include_dismissed).await?)
    }

    pub async fn dismiss_alert(&self, alert_id: Uuid) -> Result<BudgetAlert, GateError> {
        Ok(self.repository.dismiss_alert(alert_id).await?)
    }
}
