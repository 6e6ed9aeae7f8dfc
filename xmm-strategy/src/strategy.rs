//! Strategy glue: construction, callback wiring, event handling
//!
//! Owns every component of one strategy run. Venue callbacks are
//! adapted into events; the event processor's single consumer drives
//! the quoting engine, which reads books and positions, keeps the
//! resting orders in sync with the target ladder, and hedges quote
//! fills. Terminal conditions (intolerable position gap, failed recon,
//! exhausted websocket retries) cancel all resting orders on both
//! venues and raise the halt flag for the binary to act on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use xmm_core::book::Book;
use xmm_core::config::{Config, MarketConfig, PositionLimits, ReconIntervals};
use xmm_core::connector::rest::RestCredentials;
use xmm_core::connector::{
    ChannelMessage, MarketDataHandler, MessageSink, OrderChannelHandler, RestClient, WsClient,
    WsConfig, WsHandle, WsOrderRouter,
};
use xmm_core::core::{SizeRoundMode, SizeRounder};
use xmm_core::event::{Event, EventProcessor};
use xmm_core::oms::{
    HedgeVenueRejectMap, OrderManager, OrderRequest, OrderSnapshot, OrderType, PendingOpTracker,
    QuoteVenueRejectMap, RejectCodeMap,
};
use xmm_core::position::{
    PositionConfig, PositionManager, PositionSource, ReconSettings, Reconciler,
};
use xmm_core::risk::TokenBucketRateLimiter;
use xmm_core::utils::PeriodicTimer;
use xmm_core::{OrderStatus, RejectReason, ReconStatus, Side, VenueRole};

use crate::hedger::Hedger;
use crate::ladder::{LadderSettings, OffsetBase, Rung, TargetOrderManager};
use crate::order_health::OrderHealthChecker;
use crate::quote_mid::{PositionProvider, QuoteMidService, QuoteMidSettings};

/// How long an operation may sit unacknowledged before remediation.
const PENDING_OP_THRESHOLD: Duration = Duration::from_secs(5);
/// Outbound operation budget: actions per window, penalty on empty.
const RATE_LIMIT_ACTIONS: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(1);
const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(2);

pub struct Strategy {
    processor: Arc<EventProcessor>,
    reference_md: WsClient,
    quote_md: WsClient,
    hedge_md: WsClient,
    quote_order_ws: WsClient,
    hedge_order_ws: WsClient,
    quote_orders: Arc<OrderManager<WsOrderRouter>>,
    hedge_orders: Arc<OrderManager<WsOrderRouter>>,
    quote_position: Arc<PositionManager>,
    hedge_position: Arc<PositionManager>,
    md_warmups: Vec<Arc<AtomicBool>>,
    timer: PeriodicTimer,
    halted: Arc<AtomicBool>,
    stopped: AtomicBool,
    engine_parts: parking_lot::Mutex<Option<QuoteEngine>>,
}

impl Strategy {
    pub fn new(config: Config) -> Result<Self> {
        let processor = Arc::new(EventProcessor::new());
        let halted = Arc::new(AtomicBool::new(false));

        let reference_book = Arc::new(Book::new(config.quoting_reference_price.source.clone()));
        let quote_book = Arc::new(Book::new(config.markets.quote.name.clone()));
        let hedge_book = Arc::new(Book::new(config.markets.hedge.name.clone()));

        let retry_limit = config.exchange_stability.ws_reconnection_retry_limit;

        // Market-data channels
        let mut md_warmups = Vec::new();
        let reference_md = start_market_data(
            "reference-md",
            VenueRole::Reference,
            &config.quoting_reference_price.ws_uri,
            &config.quoting_reference_price.source,
            retry_limit,
            Arc::clone(&reference_book),
            &processor,
            &mut md_warmups,
        );
        let quote_md = start_market_data(
            "quote-md",
            VenueRole::Quote,
            &config.markets.quote.endpoints.market_data_ws,
            &config.markets.quote.name,
            retry_limit,
            Arc::clone(&quote_book),
            &processor,
            &mut md_warmups,
        );
        let hedge_md = start_market_data(
            "hedge-md",
            VenueRole::Hedge,
            &config.markets.hedge.endpoints.market_data_ws,
            &config.markets.hedge.name,
            retry_limit,
            Arc::clone(&hedge_book),
            &processor,
            &mut md_warmups,
        );

        // Position managers, seeded over REST
        let quote_position = build_position_manager(
            VenueRole::Quote,
            &config.markets.quote,
            &config.quote_position,
            &config.quote_recon,
        )?;
        let hedge_position = build_position_manager(
            VenueRole::Hedge,
            &config.markets.hedge,
            &config.hedge_position,
            &config.hedge_recon,
        )?;

        // Order-routing channels
        let (quote_order_ws, quote_orders) = start_order_channel(
            "quote-orders",
            VenueRole::Quote,
            &config.markets.quote,
            retry_limit,
            Box::new(QuoteVenueRejectMap),
            Arc::clone(&quote_position),
            &processor,
        );
        let (hedge_order_ws, hedge_orders) = start_order_channel(
            "hedge-orders",
            VenueRole::Hedge,
            &config.markets.hedge,
            retry_limit,
            Box::new(HedgeVenueRejectMap),
            Arc::clone(&hedge_position),
            &processor,
        );

        // Heartbeats across every open channel
        let timer = PeriodicTimer::new();
        {
            let handles: Vec<WsHandle> = vec![
                reference_md.handle(),
                quote_md.handle(),
                hedge_md.handle(),
            ];
            let quote_orders_hb = Arc::clone(&quote_orders);
            let hedge_orders_hb = Arc::clone(&hedge_orders);
            timer.start(
                Duration::from_millis(config.exchange_stability.websocket_heartbeat_ms),
                Box::new(move || {
                    info!(action = "send_ws_heartbeats");
                    for handle in &handles {
                        handle.send_heartbeat();
                    }
                    quote_orders_hb.send_heartbeat();
                    hedge_orders_hb.send_heartbeat();
                }),
            );
        }

        let engine = QuoteEngine::new(
            &config,
            Arc::clone(&quote_book),
            Arc::clone(&reference_book),
            Arc::clone(&hedge_book),
            Arc::clone(&quote_orders),
            Arc::clone(&hedge_orders),
            Arc::clone(&quote_position),
            Arc::clone(&hedge_position),
            Arc::clone(&halted),
        )?;

        info!(action = "construct_strategy", result = "pass");
        Ok(Self {
            processor,
            reference_md,
            quote_md,
            hedge_md,
            quote_order_ws,
            hedge_order_ws,
            quote_orders,
            hedge_orders,
            quote_position,
            hedge_position,
            md_warmups,
            timer,
            halted,
            stopped: AtomicBool::new(false),
            engine_parts: parking_lot::Mutex::new(Some(engine)),
        })
    }

    /// All books warmed and both position managers seeded.
    pub fn is_trading_ready(&self) -> bool {
        for (index, flag) in self.md_warmups.iter().enumerate() {
            if !flag.load(Ordering::Acquire) {
                warn!(
                    action = "check_trading_ready",
                    result = "fail",
                    reason = "book_not_ready",
                    channel = index,
                );
                return false;
            }
        }
        if !self.quote_position.is_warmed_up() {
            warn!(
                action = "check_trading_ready",
                result = "fail",
                reason = "quote_position_not_ready",
            );
            return false;
        }
        if !self.hedge_position.is_warmed_up() {
            warn!(
                action = "check_trading_ready",
                result = "fail",
                reason = "hedge_position_not_ready",
            );
            return false;
        }
        info!(action = "check_trading_ready", result = "pass");
        true
    }

    /// Poll readiness until `timeout` elapses.
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_trading_ready() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(200));
        }
    }

    /// Start the recon loops and the dispatcher, then kick trading off.
    pub fn start_trading(&self) {
        let recon_processor = Arc::clone(&self.processor);
        self.quote_position.start(Some(Box::new(move |venue, status| {
            recon_processor.submit(Event::PositionRecon(venue, status));
        })));
        let recon_processor = Arc::clone(&self.processor);
        self.hedge_position.start(Some(Box::new(move |venue, status| {
            recon_processor.submit(Event::PositionRecon(venue, status));
        })));

        let Some(mut engine) = self.engine_parts.lock().take() else {
            warn!(action = "start_trading", result = "fail", reason = "already_started");
            return;
        };
        self.processor.start(move |event| engine.handle(event));
        self.processor.submit(Event::StartTrading);
        info!(action = "start_trading", result = "pass");
    }

    /// Terminal halt requested by the event handler.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn request_stop(&self, reason: &str) {
        self.processor.submit(Event::StopTrading {
            reason: reason.to_string(),
        });
    }

    /// Stop managers, drain the dispatcher, close sockets, join
    /// threads. Idempotent; runs in reverse construction order.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.quote_position.stop();
        self.hedge_position.stop();
        info!(action = "stop_trading_managers", result = "pass");

        self.processor.stop();
        info!(action = "stop_event_processor", result = "pass");

        self.quote_order_ws.stop();
        self.hedge_order_ws.stop();
        self.reference_md.stop();
        self.quote_md.stop();
        self.hedge_md.stop();
        self.timer.stop();
        info!(action = "stop_all_ws", result = "pass");
    }
}

impl Drop for Strategy {
    fn drop(&mut self) {
        self.shutdown();
        info!(action = "destruct_strategy");
    }
}

#[allow(clippy::too_many_arguments)]
fn start_market_data(
    channel: &str,
    venue: VenueRole,
    uri: &str,
    instrument: &str,
    retry_limit: u32,
    book: Arc<Book>,
    processor: &Arc<EventProcessor>,
    warmups: &mut Vec<Arc<AtomicBool>>,
) -> WsClient {
    let subscribe = json!({
        "op": "subscribe",
        "args": [{"channel": "bookticker", "instId": instrument}],
    })
    .to_string();

    let update_processor = Arc::clone(processor);
    let handler = MarketDataHandler::new(
        channel,
        book,
        vec![subscribe],
        Some(json!({"op": "ping"}).to_string()),
        Arc::new(move || {
            update_processor.submit(Event::MarketUpdate(venue));
        }),
    );
    warmups.push(handler.warmed_up_flag());

    let client = WsClient::new(WsConfig::new(uri, retry_limit));
    let disconnect_processor = Arc::clone(processor);
    client.start(
        handler,
        Arc::new(move |reached_retry_limit| {
            disconnect_processor.submit(Event::WsDisconnected {
                reached_retry_limit,
            });
        }),
    );
    client
}

fn build_position_manager(
    venue: VenueRole,
    market: &MarketConfig,
    limits: &PositionLimits,
    recon: &ReconIntervals,
) -> Result<Arc<PositionManager>> {
    let rest = RestClient::new(
        market.endpoints.rest.clone(),
        market.name.clone(),
        RestCredentials {
            api_key: market.exchange_keys.api_key.clone(),
            api_secret: market.exchange_keys.api_secret.clone(),
            api_passphrase: market.exchange_keys.api_passphrase.clone(),
        },
    )
    .context("building position rest client")?;

    let settings = ReconSettings {
        tick_size: market.tick_sizes.quantity,
        tolerable_threshold: recon.tolerable_threshold,
        max_mismatch_cnt: recon.max_mismatch_cnt,
        max_failure_query_cnt: recon.max_failure_query_cnt,
        retry_interval_on_failure: Duration::from_millis(recon.retry_interval_on_failure_ms),
        normal_recon_interval: Duration::from_millis(recon.normal_recon_interval_ms),
        retry_interval_on_mismatch: Duration::from_millis(recon.retry_interval_on_mismatch_ms),
    };
    let reconciler = Reconciler::new(venue, settings, Box::new(rest) as Box<dyn PositionSource>);
    Ok(Arc::new(PositionManager::new(
        PositionConfig {
            venue,
            max_position: limits.max_position,
            base_position: limits.base_position,
            contract_multiplier: market.contract_multiplier,
        },
        reconciler,
    )))
}

fn start_order_channel(
    channel: &str,
    venue: VenueRole,
    market: &MarketConfig,
    retry_limit: u32,
    reject_map: Box<dyn RejectCodeMap>,
    position: Arc<PositionManager>,
    processor: &Arc<EventProcessor>,
) -> (WsClient, Arc<OrderManager<WsOrderRouter>>) {
    let auth = json!({
        "op": "auth",
        "args": [{
            "apiKey": market.exchange_keys.api_key,
            "passphrase": market.exchange_keys.api_passphrase,
        }],
    })
    .to_string();

    let sink = MessageSink::new();
    let handler = OrderChannelHandler::new(
        channel,
        vec![auth],
        Some(json!({"op": "ping"}).to_string()),
        sink.clone(),
    );

    let client = WsClient::new(WsConfig::new(market.endpoints.order_ws.as_str(), retry_limit));
    let router = WsOrderRouter::new(
        client.handle(),
        SizeRounder::new(market.tick_sizes.quantity, SizeRoundMode::Floor)
            .expect("validated quantity tick"),
        Some(json!({"op": "ping"}).to_string()),
    );

    let manager = Arc::new(OrderManager::new(
        venue,
        router,
        market.number_of_orders_to_track,
        reject_map,
        market.contract_multiplier,
        position,
    ));

    let status_processor = Arc::clone(processor);
    manager.set_order_status_callback(Box::new(move |snapshot| {
        status_processor.submit(Event::OrderUpdate(venue, snapshot));
    }));
    let health_processor = Arc::clone(processor);
    manager.set_ws_health_callback(Box::new(move |reached_retry_limit| {
        health_processor.submit(Event::WsDisconnected {
            reached_retry_limit,
        });
    }));

    let sink_manager = Arc::clone(&manager);
    sink.bind(Box::new(move |message| match message {
        ChannelMessage::Ack(frame) => sink_manager.apply_ack(frame),
        ChannelMessage::Update(frame) => sink_manager.apply_order_update(frame),
    }));

    let disconnect_processor = Arc::clone(processor);
    client.start(
        handler,
        Arc::new(move |reached_retry_limit| {
            disconnect_processor.submit(Event::WsDisconnected {
                reached_retry_limit,
            });
        }),
    );
    (client, manager)
}

/// Mutable quoting state owned by the dispatcher thread.
struct QuoteEngine {
    quote_instrument: String,
    live_trading_enabled: bool,
    ladder: TargetOrderManager,
    quote_mid: QuoteMidService,
    health: OrderHealthChecker,
    hedger: Hedger<WsOrderRouter>,
    reference_book: Arc<Book>,
    quote_orders: Arc<OrderManager<WsOrderRouter>>,
    quote_position: Arc<PositionManager>,
    quote_rest: RestClient,
    hedge_rest: RestClient,
    rate_limiter: TokenBucketRateLimiter,
    pending_submissions: PendingOpTracker,
    pending_modifications: PendingOpTracker,
    pending_cancellations: PendingOpTracker,
    degraded: bool,
    halted: Arc<AtomicBool>,
}

impl QuoteEngine {
    #[allow(clippy::too_many_arguments)]
    fn new(
        config: &Config,
        quote_book: Arc<Book>,
        reference_book: Arc<Book>,
        hedge_book: Arc<Book>,
        quote_orders: Arc<OrderManager<WsOrderRouter>>,
        hedge_orders: Arc<OrderManager<WsOrderRouter>>,
        quote_position: Arc<PositionManager>,
        hedge_position: Arc<PositionManager>,
        halted: Arc<AtomicBool>,
    ) -> Result<Self> {
        let quoting = &config.quoting;
        let ladder = TargetOrderManager::new(
            Arc::clone(&quote_book),
            Arc::clone(&reference_book),
            LadderSettings {
                price_tick_size: config.markets.quote.tick_sizes.price,
                quantity_tick_size: config.markets.quote.tick_sizes.quantity,
                price_round_mode: config.price_round_mode()?,
                size_round_mode: config.size_round_mode()?,
                offset_base: if quoting.offset_base == "touch" {
                    OffsetBase::Touch
                } else {
                    OffsetBase::Mid
                },
                enable_touch_price: quoting.enable_touch_price,
                ticks_from_touch: quoting.ticks_from_touch,
                enable_postable_price: quoting.enable_postable_price,
                ticks_from_postable: quoting.ticks_from_postable,
            },
            quoting
                .ask_orders
                .iter()
                .map(|rung| Rung {
                    offset: rung.offset,
                    size: rung.size,
                })
                .collect(),
            quoting
                .bid_orders
                .iter()
                .map(|rung| Rung {
                    offset: rung.offset,
                    size: rung.size,
                })
                .collect(),
        )?;

        let quote_mid = QuoteMidService::new(
            QuoteMidSettings {
                use_const_shift: quoting.quote_mid.use_const_shift,
                const_shift_ratio: quoting.quote_mid.const_shift_ratio,
                use_position_shift: quoting.quote_mid.use_position_shift,
                shift_ratio_per_position: quoting.quote_mid.shift_ratio_per_position,
            },
            Arc::clone(&quote_position) as Arc<dyn PositionProvider>,
        )?;

        let hedger = Hedger::new(
            hedge_orders,
            Arc::clone(&quote_position),
            hedge_position,
            hedge_book,
            config.markets.hedge.name.clone(),
            config.hedging.min_hedge_size,
            config.hedging.stale_threshold_ns,
            config.hedging.max_spread,
        );

        let quote_rest = RestClient::new(
            config.markets.quote.endpoints.rest.clone(),
            config.markets.quote.name.clone(),
            RestCredentials {
                api_key: config.markets.quote.exchange_keys.api_key.clone(),
                api_secret: config.markets.quote.exchange_keys.api_secret.clone(),
                api_passphrase: config.markets.quote.exchange_keys.api_passphrase.clone(),
            },
        )?;
        let hedge_rest = RestClient::new(
            config.markets.hedge.endpoints.rest.clone(),
            config.markets.hedge.name.clone(),
            RestCredentials {
                api_key: config.markets.hedge.exchange_keys.api_key.clone(),
                api_secret: config.markets.hedge.exchange_keys.api_secret.clone(),
                api_passphrase: config.markets.hedge.exchange_keys.api_passphrase.clone(),
            },
        )?;

        Ok(Self {
            quote_instrument: config.markets.quote.name.clone(),
            live_trading_enabled: config.trading_control.live_trading_enabled,
            ladder,
            quote_mid,
            health: OrderHealthChecker::new(quoting.order_health_min_distance),
            hedger,
            reference_book,
            quote_orders,
            quote_position,
            quote_rest,
            hedge_rest,
            rate_limiter: TokenBucketRateLimiter::new(
                RATE_LIMIT_ACTIONS,
                RATE_LIMIT_WINDOW,
                RATE_LIMIT_COOLDOWN,
            )
            .expect("static limiter settings"),
            pending_submissions: PendingOpTracker::new(PENDING_OP_THRESHOLD),
            pending_modifications: PendingOpTracker::new(PENDING_OP_THRESHOLD),
            pending_cancellations: PendingOpTracker::new(PENDING_OP_THRESHOLD),
            degraded: false,
            halted,
        })
    }

    fn handle(&mut self, event: Event) -> Result<()> {
        match event {
            Event::StartTrading => {
                info!(action = "handle_start_trading");
                self.ladder.set_both_dirty();
                self.requote();
            }
            Event::StopTrading { reason } => self.halt(&reason),
            Event::MarketUpdate(venue) => self.handle_market_update(venue),
            Event::OrderUpdate(venue, snapshot) => self.handle_order_update(venue, &snapshot),
            Event::PositionRecon(venue, status) => self.handle_position_recon(venue, status),
            Event::PnlRecon(ok) => {
                info!(action = "handle_pnl_recon", result = if ok { "pass" } else { "fail" });
            }
            Event::WsDisconnected {
                reached_retry_limit,
            } => {
                if reached_retry_limit {
                    self.halt("ws_retry_limit_reached");
                } else {
                    warn!(action = "handle_ws_disconnected", reached_retry_limit = false);
                }
            }
        }
        Ok(())
    }

    fn handle_market_update(&mut self, venue: VenueRole) {
        match venue {
            VenueRole::Reference | VenueRole::Quote => {
                self.ladder.set_both_dirty();
                self.requote();
            }
            // Hedge book motion can unblock a deferred hedge
            VenueRole::Hedge => self.try_hedge(),
        }
    }

    fn handle_order_update(&mut self, venue: VenueRole, snapshot: &xmm_core::OrderSnapshot) {
        if venue == VenueRole::Quote {
            if snapshot.status != OrderStatus::Pending {
                self.pending_submissions.remove(snapshot.client_order_id);
                self.pending_modifications.remove(snapshot.client_order_id);
            }
            if matches!(snapshot.status, OrderStatus::Canceled | OrderStatus::Rejected) {
                self.pending_cancellations.remove(snapshot.client_order_id);
            }
        }

        if snapshot.reason == RejectReason::ThrottleHit {
            warn!(
                action = "handle_order_update",
                reason = "throttle_hit",
                client_order_id = snapshot.client_order_id,
            );
            self.rate_limiter.on_rate_limit_hit(Instant::now());
        }

        let is_fill = matches!(
            snapshot.status,
            OrderStatus::PartiallyFilled | OrderStatus::Filled
        ) && snapshot.fill_sz > 0.0;
        if venue == VenueRole::Quote && is_fill {
            info!(
                action = "handle_quote_fill",
                client_order_id = snapshot.client_order_id,
                fill_px = snapshot.fill_px,
                fill_sz = snapshot.fill_sz,
                maker = snapshot.fill_maker,
            );
            self.try_hedge();
        }

        // Any lifecycle change can invalidate the resting set
        self.ladder.set_both_dirty();
        self.requote();
    }

    fn handle_position_recon(&mut self, venue: VenueRole, status: ReconStatus) {
        match status {
            ReconStatus::NoGap => {
                if self.degraded {
                    info!(action = "handle_position_recon", result = "recovered", venue = %venue);
                    self.degraded = false;
                }
            }
            ReconStatus::TolerableGap => {
                warn!(action = "handle_position_recon", venue = %venue, status = "tolerable_gap");
            }
            ReconStatus::UndeterminedGap => {
                warn!(action = "handle_position_recon", venue = %venue, status = "undetermined_gap");
                self.degraded = true;
            }
            ReconStatus::IntolerableGap => self.halt("intolerable_position_gap"),
            ReconStatus::FailedQuery => self.halt("position_query_failed"),
        }
    }

    fn try_hedge(&mut self) {
        let (healthy, reason) = self.hedger.healthcheck();
        if !healthy {
            debug!(action = "hedge", result = "skip", reason);
            return;
        }
        self.hedger.hedge();
    }

    /// Terminal stop: best-effort cancel everywhere, then raise the
    /// halt flag for the binary.
    fn halt(&mut self, reason: &str) {
        if self.halted.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(action = "handle_stop_trading", reason);
        self.quote_rest.cancel_all();
        self.hedge_rest.cancel_all();
    }

    fn requote(&mut self) {
        if self.halted.load(Ordering::Acquire) || self.degraded {
            return;
        }
        self.remediate_stuck_operations();
        for side in [Side::Bid, Side::Ask] {
            self.ladder.refresh(side, &self.quote_mid);
            self.sync_side(side);
        }
    }

    /// Cancel-if-still-pending for operations that outlived their wait.
    fn remediate_stuck_operations(&mut self) {
        for client_order_id in self.pending_submissions.outdated() {
            warn!(
                action = "remediate_pending_submission",
                client_order_id,
            );
            self.pending_submissions.remove(client_order_id);
            if self
                .quote_orders
                .cancel_order(client_order_id, &self.quote_instrument)
                != 0
            {
                self.pending_cancellations.add(client_order_id);
            }
        }
        for client_order_id in self.pending_modifications.outdated() {
            warn!(action = "remediate_pending_modification", client_order_id);
            self.pending_modifications.remove(client_order_id);
            if self
                .quote_orders
                .cancel_order(client_order_id, &self.quote_instrument)
                != 0
            {
                self.pending_cancellations.add(client_order_id);
            }
        }
        for client_order_id in self.pending_cancellations.outdated() {
            warn!(action = "remediate_pending_cancellation", client_order_id);
            self.pending_cancellations.remove(client_order_id);
            self.quote_orders
                .cancel_order(client_order_id, &self.quote_instrument);
        }
    }

    fn sync_side(&mut self, side: Side) {
        if !self.live_trading_enabled {
            return;
        }
        let actives = self.quote_orders.active_orders();

        // Cancel resting orders that no longer match a target
        for order in actives.iter().filter(|o| o.side == side) {
            let price = resting_price(order);
            let size = if order.status == OrderStatus::Pending {
                order.qty_submitted
            } else {
                order.remaining_qty()
            };
            if self.ladder.is_in_target_orders(side, price, size) {
                continue;
            }
            if self.pending_cancellations.has(order.client_order_id)
                || self.pending_modifications.has(order.client_order_id)
            {
                continue;
            }
            if !self.rate_limiter.try_consume() {
                warn!(action = "sync_quotes", result = "skip", reason = "rate_limited");
                return;
            }
            // Right price level, wrong size: amend in place
            if let Some(target) = self.ladder.target_at(side, price) {
                if order.status == OrderStatus::Live
                    && self.quote_orders.modify_order(
                        order.client_order_id,
                        target.price,
                        target.size,
                        &self.quote_instrument,
                    ) != 0
                {
                    self.pending_modifications.add(order.client_order_id);
                    continue;
                }
            }
            if self
                .quote_orders
                .cancel_order(order.client_order_id, &self.quote_instrument)
                != 0
            {
                self.pending_cancellations.add(order.client_order_id);
            }
        }

        if self.quote_position.is_max_position(side) {
            warn!(action = "sync_quotes", side = %side, result = "skip", reason = "max_position");
            return;
        }
        if !self.health.check(side, &self.ladder, &self.reference_book, &self.quote_mid) {
            // A side with no targets is legitimately empty
            if self.ladder.target_count(side) > 0 {
                warn!(action = "sync_quotes", side = %side, result = "skip", reason = "unhealthy");
            }
            return;
        }

        // Place targets not yet covered by a resting order
        for target in self.ladder.targets(side) {
            let covered = actives.iter().any(|order| {
                order.side == side && (resting_price(order) - target.price).abs() < 1e-9
            });
            if covered {
                continue;
            }
            if !self.rate_limiter.try_consume() {
                warn!(action = "sync_quotes", result = "skip", reason = "rate_limited");
                return;
            }
            let client_order_id = self.quote_orders.place_order(OrderRequest {
                instrument: self.quote_instrument.clone(),
                price: target.price,
                qty: target.size,
                buy: side.is_buy(),
                order_type: OrderType::Limit,
                td_mode: "cross".into(),
                ban_amend: true,
            });
            if client_order_id != 0 {
                self.pending_submissions.add(client_order_id);
            }
        }
    }
}

/// Price an active order is (or will be) resting at.
fn resting_price(order: &OrderSnapshot) -> f64 {
    if order.status == OrderStatus::Pending || order.price_on_exch == 0.0 {
        order.price_submitted
    } else {
        order.price_on_exch
    }
}
