//! Keeper Supervisor (spec §4.1).
//!
//! Runs four independent periodic loops per pool — kick, take,
//! bond-collect, lp-collect — each in its own task so a stuck or
//! erroring loop for one pool/action never blocks the others. Modeled
//! after the teacher's single `Engine::run` task-per-concern shape, but
//! generalized to `tokio::task::JoinSet` across N pools x 4 actions
//! rather than one collector/strategy/executor triad.

use std::sync::Arc;
use std::time::Duration;

use ethers::providers::Middleware;
use ethers::types::Address;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::Config;
use crate::nonce::NoncePipeline;
use crate::pool_registry::PoolRegistry;
use crate::price::PriceResolver;
use crate::subgraph::SubgraphClient;

use crate::engines::bond_collector::CollectOutcome;
use crate::engines::{bond_collector, kick, lp_collector, settlement, take};
use crate::metrics::Metrics;
use crate::reward_queue::RewardActionQueue;
use crate::wad::Wad;

/// Everything a per-pool loop needs that isn't specific to one action.
pub struct SupervisorContext<M> {
    pub client: Arc<M>,
    pub config: Arc<Config>,
    pub registry: Arc<PoolRegistry>,
    pub subgraph: Arc<SubgraphClient>,
    pub price_resolver: Arc<PriceResolver>,
    pub pipeline: Arc<NoncePipeline<M>>,
    pub bot_address: Address,
    pub chain_id: u64,
    pub reward_queue: Arc<tokio::sync::Mutex<RewardActionQueue>>,
    pub metrics: Arc<Metrics>,
}

/// Spawns the four per-pool loops for every configured pool and waits
/// on all of them; an individual loop returning an error is logged and
/// the rest keep running (spec §4.1's independence requirement).
pub async fn run<M: Middleware + 'static>(ctx: SupervisorContext<M>) -> anyhow::Result<()> {
    let mut set: JoinSet<()> = JoinSet::new();

    for pool in ctx.registry.iter() {
        let address = pool.config.address;

        if pool.config.kick.is_some() {
            let ctx = clone_ctx(&ctx);
            set.spawn(async move { kick_loop(ctx, address).await });
        }
        if pool.config.take.is_some() {
            let ctx = clone_ctx(&ctx);
            set.spawn(async move { take_loop(ctx, address).await });
        }
        if pool.config.collect_bond {
            let ctx = clone_ctx(&ctx);
            set.spawn(async move { bond_collect_loop(ctx, address).await });
        }
        if pool.config.collect_lp_reward.is_some() {
            let ctx = clone_ctx(&ctx);
            set.spawn(async move { lp_collect_loop(ctx, address).await });
        }
        if pool.config.settlement.is_some() {
            let ctx = clone_ctx(&ctx);
            set.spawn(async move { settlement_loop(ctx, address).await });
        }
    }

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            error!("a keeper loop task panicked: {e}");
        }
    }
    Ok(())
}

fn clone_ctx<M>(ctx: &SupervisorContext<M>) -> SupervisorContext<M> {
    SupervisorContext {
        client: ctx.client.clone(),
        config: ctx.config.clone(),
        registry: ctx.registry.clone(),
        subgraph: ctx.subgraph.clone(),
        price_resolver: ctx.price_resolver.clone(),
        pipeline: ctx.pipeline.clone(),
        bot_address: ctx.bot_address,
        chain_id: ctx.chain_id,
        reward_queue: ctx.reward_queue.clone(),
        metrics: ctx.metrics.clone(),
    }
}

async fn kick_loop<M: Middleware + 'static>(ctx: SupervisorContext<M>, pool_address: Address) {
    loop {
        if let Some(registered) = ctx.registry.get(pool_address) {
            let kick_config = registered.config.kick.clone().expect("kick loop requires kick config");
            let price = ctx
                .price_resolver
                .resolve(&registered.config.price, registered.sdk.as_ref())
                .await;
            if !crate::price::is_nan_price(price) {
                let result = kick::run_kick_loop(
                    registered.sdk.as_ref(),
                    &kick_config,
                    price,
                    &ctx.subgraph,
                    |borrower, limit_index| {
                        let pool = registered.sdk.clone();
                        let pipeline = ctx.pipeline.clone();
                        let dry_run = ctx.config.dry_run;
                        async move { kick::submit_kick(pool.as_ref(), &pipeline, borrower, limit_index, dry_run).await }
                    },
                )
                .await;
                let pool_label = registered.config.name.clone();
                match result {
                    Ok(outcome) => {
                        ctx.metrics
                            .kicks_total
                            .with_label_values(&[&pool_label, "kicked"])
                            .inc_by(outcome.kicked.len() as f64);
                        ctx.metrics
                            .kicks_total
                            .with_label_values(&[&pool_label, "skipped"])
                            .inc_by(outcome.skipped as f64);
                    }
                    Err(e) => {
                        ctx.metrics.loop_errors_total.with_label_values(&[&pool_label, "kick"]).inc();
                        error!("kick loop error for pool {:?}: {e}", pool_address);
                    }
                }
            }
        }
        tokio::time::sleep(Duration::from_secs(ctx.config.delay_between_runs)).await;
    }
}

async fn take_loop<M: Middleware + 'static>(ctx: SupervisorContext<M>, pool_address: Address) {
    loop {
        if let Some(registered) = ctx.registry.get(pool_address) {
            let take_config = registered.config.take.clone().expect("take loop requires take config");
            let router = take_config.liquidity_source.and_then(|source| {
                crate::dex::resolve_liquidity_source(ctx.client.clone(), &ctx.config.dex, source)
            });
            let helper = take_config.liquidity_source.and_then(|source| {
                match crate::dex::resolve_take_helper(source, &ctx.config) {
                    crate::dex::DeploymentShape::Single(a) | crate::dex::DeploymentShape::Factory(a) => Some(a),
                    crate::dex::DeploymentShape::None => None,
                }
            });
            let dry_run = ctx.config.dry_run;
            let pool = registered.sdk.clone();
            let pipeline = ctx.pipeline.clone();
            let result = take::run_take_scan(
                registered.sdk.as_ref(),
                &take_config,
                router.as_deref(),
                helper,
                registered.sdk.collateral_token(),
                registered.sdk.quote_token(),
                &ctx.subgraph,
                |borrower, bucket_index| {
                    let pool = pool.clone();
                    let pipeline = pipeline.clone();
                    async move { take::submit_arb_take(pool.as_ref(), &pipeline, borrower, bucket_index, dry_run).await }
                },
                |borrower, max_amount, helper_address, calldata| {
                    let pool = pool.clone();
                    let pipeline = pipeline.clone();
                    async move {
                        take::submit_external_take(
                            pool.as_ref(),
                            &pipeline,
                            borrower,
                            max_amount,
                            helper_address,
                            calldata,
                            dry_run,
                        )
                        .await
                    }
                },
            )
            .await;
            let pool_label = registered.config.name.clone();
            match result {
                Ok(outcomes) => {
                    for outcome in &outcomes {
                        let mode_label = match outcome.mode {
                            take::TakeMode::ArbTake => "arb_take",
                            take::TakeMode::ExternalTake => "external_take",
                        };
                        ctx.metrics.takes_total.with_label_values(&[&pool_label, mode_label]).inc();
                    }
                }
                Err(e) => {
                    ctx.metrics.loop_errors_total.with_label_values(&[&pool_label, "take"]).inc();
                    error!("take loop error for pool {:?}: {e}", pool_address);
                }
            }
        }
        tokio::time::sleep(Duration::from_secs(ctx.config.delay_between_runs)).await;
    }
}

async fn bond_collect_loop<M: Middleware + 'static>(ctx: SupervisorContext<M>, pool_address: Address) {
    loop {
        if let Some(registered) = ctx.registry.get(pool_address) {
            if let Some(settlement_config) = &registered.config.settlement {
                let now = now_secs();
                let dry_run = ctx.config.dry_run;
                let pool = registered.sdk.clone();
                let pipeline = ctx.pipeline.clone();
                let pool_for_settle = pool.clone();
                let pipeline_for_settle = pipeline.clone();
                let result = bond_collector::collect_bond(
                    registered.sdk.as_ref(),
                    settlement_config,
                    ctx.bot_address,
                    ctx.bot_address,
                    now,
                    ctx.config.delay_between_actions,
                    |d| tokio::time::sleep(d),
                    move |borrower, max_bucket_depth| {
                        let pool = pool_for_settle.clone();
                        let pipeline = pipeline_for_settle.clone();
                        async move {
                            settlement::submit_settle(pool.as_ref(), &pipeline, borrower, max_bucket_depth, dry_run).await
                        }
                    },
                    move |bot, recipient, amount| {
                        let pool = pool.clone();
                        let pipeline = pipeline.clone();
                        async move {
                            bond_collector::submit_withdraw_bonds(pool.as_ref(), &pipeline, bot, recipient, amount, dry_run)
                                .await
                        }
                    },
                )
                .await;
                let pool_label = registered.config.name.clone();
                match result {
                    Ok(outcome) => {
                        let outcome_label = match outcome {
                            CollectOutcome::Withdrew => "withdrew",
                            CollectOutcome::SettledThenWithdrew => "settled_then_withdrew",
                            CollectOutcome::SettledButStillLocked => "settled_but_still_locked",
                            CollectOutcome::NoOp => "no_op",
                        };
                        ctx.metrics
                            .bond_collections_total
                            .with_label_values(&[&pool_label, outcome_label])
                            .inc();
                    }
                    Err(e) => {
                        ctx.metrics
                            .loop_errors_total
                            .with_label_values(&[&pool_label, "bond_collect"])
                            .inc();
                        error!("bond collect loop error for pool {:?}: {e}", pool_address);
                    }
                }
            } else {
                info!("pool {:?} has collect_bond enabled without a settlement config; skipping", pool_address);
            }
        }
        tokio::time::sleep(Duration::from_secs(ctx.config.delay_between_runs)).await;
    }
}

async fn lp_collect_loop<M: Middleware + 'static>(ctx: SupervisorContext<M>, pool_address: Address) {
    let mut accumulator = lp_collector::LpAccumulator::default();
    let mut last_seen_block: Option<u64> = None;

    loop {
        if let Some(registered) = ctx.registry.get(pool_address) {
            let pool = registered.sdk.as_ref();

            match pool.current_block().await {
                Ok(current) => {
                    let from_block = last_seen_block.unwrap_or(current);
                    match pool.lp_award_events_since(from_block, ctx.bot_address).await {
                        Ok(events) => {
                            for event in &events {
                                let mut own_share = Wad::ZERO;
                                if event.taker == ctx.bot_address {
                                    own_share = own_share + event.taker_lp;
                                }
                                if event.kicker == ctx.bot_address {
                                    own_share = own_share + event.kicker_lp;
                                }
                                accumulator.record(event, own_share);
                            }
                            last_seen_block = Some(current);
                        }
                        Err(e) => error!("failed to read LP award events for pool {:?}: {e}", pool_address),
                    }
                }
                Err(e) => error!("failed to read current block for pool {:?}: {e}", pool_address),
            }

            if let (Some(config), Some(settlement_config)) =
                (&registered.config.collect_lp_reward, &registered.config.settlement)
            {
                let buckets: Vec<u32> = accumulator.by_bucket.keys().copied().collect();
                for bucket in buckets {
                    let now = now_secs();
                    let dry_run = ctx.config.dry_run;
                    let pool_arc = registered.sdk.clone();
                    let pipeline = ctx.pipeline.clone();
                    let pool_for_settle = pool_arc.clone();
                    let pipeline_for_settle = pipeline.clone();
                    match lp_collector::redeem_bucket(
                        pool,
                        config,
                        settlement_config,
                        ctx.bot_address,
                        bucket,
                        now,
                        ctx.config.delay_between_actions,
                        |d| tokio::time::sleep(d),
                        move |borrower, max_bucket_depth| {
                            let pool = pool_for_settle.clone();
                            let pipeline = pipeline_for_settle.clone();
                            async move {
                                settlement::submit_settle(pool.as_ref(), &pipeline, borrower, max_bucket_depth, dry_run)
                                    .await
                            }
                        },
                        move |side, bucket, amount| {
                            let pool = pool_arc.clone();
                            let pipeline = pipeline.clone();
                            async move {
                                lp_collector::submit_redeem(pool.as_ref(), &pipeline, side, bucket, amount, dry_run).await
                            }
                        },
                    )
                    .await
                    {
                        Ok(Some(outcome)) => {
                            lp_collector::mark_redeemed(&mut accumulator, outcome.bucket);
                            let side_label = match outcome.side {
                                crate::config::RedeemSide::Quote => "quote",
                                crate::config::RedeemSide::Collateral => "collateral",
                            };
                            ctx.metrics
                                .lp_redemptions_total
                                .with_label_values(&[&registered.config.name, side_label])
                                .inc();
                            if let Some(action) = outcome.enqueue {
                                let token = match outcome.side {
                                    crate::config::RedeemSide::Quote => pool.quote_token(),
                                    crate::config::RedeemSide::Collateral => pool.collateral_token(),
                                };
                                ctx.reward_queue.lock().await.enqueue(token, action, outcome.lp_consumed);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            ctx.metrics
                                .loop_errors_total
                                .with_label_values(&[&registered.config.name, "lp_collect"])
                                .inc();
                            error!("lp redemption failed for bucket {} of pool {:?}: {e}", bucket, pool_address);
                        }
                    }
                }
            }
        }

        flush_reward_queue(&ctx, token_decimals_table(&ctx)).await;

        tokio::time::sleep(Duration::from_secs(ctx.config.delay_between_runs)).await;
    }
}

/// Every distinct `(token, decimals)` pair known across the registry's
/// pools, so the reward queue flush (which is not pool-scoped — one
/// shared queue drains rewards from every pool) can look up the right
/// decimals for whichever token a queued reward names.
fn token_decimals_table<M>(ctx: &SupervisorContext<M>) -> std::collections::HashMap<Address, u8> {
    let mut table = std::collections::HashMap::new();
    for pool in ctx.registry.iter() {
        table.insert(pool.sdk.collateral_token(), pool.sdk.collateral_decimals());
        table.insert(pool.sdk.quote_token(), pool.sdk.quote_decimals());
    }
    table
}

/// Drains whatever's accumulated in the shared Reward Action Queue,
/// executing each `{token, action}` entry against the real chain. A
/// one-inch reward action resolves its per-chain router address from
/// `one_inch_routers`; every other provider goes through `DexConfig`.
async fn flush_reward_queue<M: Middleware + 'static>(
    ctx: &SupervisorContext<M>,
    decimals_table: std::collections::HashMap<Address, u8>,
) {
    let one_inch_router = ctx.config.one_inch_routers.get(&ctx.chain_id).copied();
    let mut queue = ctx.reward_queue.lock().await;
    if queue.is_empty() {
        return;
    }
    let result = queue
        .handle_all::<M, _, _>(|token, action, amount| {
            let client = ctx.client.clone();
            let dex_config = ctx.config.dex.clone();
            let token_addresses = ctx.config.token_addresses.clone();
            let weth_address = ctx.config.weth_address;
            let bot_address = ctx.bot_address;
            let pipeline = ctx.pipeline.clone();
            let decimals = decimals_table.get(&token).copied().unwrap_or(18);
            let metrics = ctx.metrics.clone();
            async move {
                let result = crate::reward_queue::execute_reward_action(
                    client,
                    pipeline.as_ref(),
                    &dex_config,
                    one_inch_router,
                    &token_addresses,
                    weth_address,
                    bot_address,
                    decimals,
                    token,
                    action,
                    amount,
                )
                .await;
                let token_label = format!("{:?}", token);
                let result_label = if result.is_ok() { "ok" } else { "error" };
                metrics.reward_actions_total.with_label_values(&[&token_label, result_label]).inc();
                result
            }
        })
        .await;
    if let Err(e) = result {
        error!("reward queue flush error: {e}");
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Reactive hook the Bond/LP collectors call before acting on a
/// borrower whose auction may still need settling (spec §4.6).
pub async fn ensure_settled<M: Middleware + 'static>(
    pool: &dyn crate::sdk::PoolSdk,
    pipeline: &NoncePipeline<M>,
    settlement_config: &crate::config::SettlementConfig,
    bot_address: Address,
    borrower: Address,
    delay_between_actions: u64,
    dry_run: bool,
) -> anyhow::Result<bool> {
    settlement::try_reactive_settlement(
        pool,
        settlement_config,
        bot_address,
        borrower,
        now_secs(),
        delay_between_actions,
        |d| tokio::time::sleep(d),
        |b, depth| settlement::submit_settle(pool, pipeline, b, depth, dry_run),
    )
    .await
}

/// Proactive settlement sweep (spec §4.6): scans the subgraph's
/// unsettled-auction hint list for this pool and settles every
/// on-chain-confirmed candidate, independent of whatever the bond/LP
/// collectors trigger reactively.
async fn settlement_loop<M: Middleware + 'static>(ctx: SupervisorContext<M>, pool_address: Address) {
    loop {
        if let Some(registered) = ctx.registry.get(pool_address) {
            if let Some(settlement_config) = &registered.config.settlement {
                let now = now_secs();
                let dry_run = ctx.config.dry_run;
                let pool = registered.sdk.clone();
                let pipeline = ctx.pipeline.clone();
                let result = settlement::run_settlement_sweep(
                    registered.sdk.as_ref(),
                    settlement_config,
                    ctx.bot_address,
                    &ctx.subgraph,
                    now,
                    ctx.config.delay_between_actions,
                    |d| tokio::time::sleep(d),
                    move |borrower, max_bucket_depth| {
                        let pool = pool.clone();
                        let pipeline = pipeline.clone();
                        async move {
                            settlement::submit_settle(pool.as_ref(), &pipeline, borrower, max_bucket_depth, dry_run).await
                        }
                    },
                )
                .await;
                let pool_label = registered.config.name.clone();
                match result {
                    Ok(outcomes) => {
                        for outcome in &outcomes {
                            let reason_label = match outcome.reason {
                                settlement::SettlementReason::Completed => "completed",
                                settlement::SettlementReason::MaxIterationsReached => "max_iterations_reached",
                                settlement::SettlementReason::NotReady => "not_ready",
                                settlement::SettlementReason::Disabled => "disabled",
                            };
                            ctx.metrics
                                .settlements_total
                                .with_label_values(&[&pool_label, reason_label])
                                .inc();
                        }
                    }
                    Err(e) => {
                        ctx.metrics
                            .loop_errors_total
                            .with_label_values(&[&pool_label, "settlement"])
                            .inc();
                        error!("settlement sweep error for pool {:?}: {e}", pool_address);
                    }
                }
            }
        }
        tokio::time::sleep(Duration::from_secs(ctx.config.delay_between_runs)).await;
    }
}
