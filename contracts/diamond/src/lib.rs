#![cfg_attr(not(feature = "std"), no_std, no_main)]

/// # Diamond Protocol — Token Engine
///
/// **Role:** Ground-truth $DMD ledger, pair registry, hour clock, emission
/// governor, and proportional-share withdrawal engine.
///
/// ## Distribution model
///
/// Contributors stake ("burn") a registered pair asset through the engine;
/// the stake is pulled from the contributor and forwarded irrevocably to
/// the sink address. In exchange the contributor earns a pro-rata claim on
/// the $DMD tranche emitted for the hour the stake landed in.
///
/// ```text
/// contribute(pair, amount):
///   pair.transfer_from(caller → engine)   stake pulled
///   pair.transfer(engine → sink)          stake forwarded, gone for good
///   units[pair][hour][caller] += amount   claim weight recorded
///
/// every hour boundary (lazy, one per call):
///   remaining = total_supply − initial_supply − total_emitted
///   slot 0:    remaining × 80 / 10_000 / 24   (primary pair, double weight)
///   slots 1-3: remaining × 40 / 10_000 / 24   (secondary pairs)
///   tranche locked into emission[pair][closing hour]
///
/// withdraw(pair):
///   for each settled hour in the caller's history:
///     share = min(emission, engine balance) × units / total_units  (floor)
///     units zeroed, then share paid from the engine's own balance
/// ```
///
/// The schedule is geometric-like decay: every sealed hour shrinks the
/// remaining pool, so each hour's tranche is strictly smaller than the
/// last while emission continues.
///
/// ## Clock discipline
///
/// The hour clock is pull-based. Every accrual-sensitive entry point runs
/// one `advance_if_due` step first; a boundary that nobody crosses with a
/// call is skipped outright and never receives emission. `tick_hour` is a
/// public keeper message for operators who want the clock kept dense.
///
/// **Compatibility:** ink! v5 / `pallet-contracts`.
#[ink::contract]
mod diamond {
    use ink::env::call::{build_call, ExecutionInput, Selector};
    use ink::env::DefaultEnvironment;
    use ink::prelude::string::String;
    use ink::prelude::vec::Vec;
    use ink::storage::Mapping;

    // =========================================================================
    // CONSTANTS
    // =========================================================================

    /// Base unit scaling (18 decimals).
    pub const SCALING_FACTOR: u128 = 1_000_000_000_000_000_000;

    /// Total $DMD supply, minted once at deployment.
    pub const TOTAL_SUPPLY: u128 = 10_000_000 * SCALING_FACTOR;

    /// Circulating allocation minted to the deployer. The remainder
    /// (`TOTAL_SUPPLY − INITIAL_CIRCULATING`) is the distribution pool and
    /// stays on the engine's own balance until withdrawn as rewards.
    pub const INITIAL_CIRCULATING: u128 = 2_000_000 * SCALING_FACTOR;

    /// Denominator for all basis-point calculations.
    pub const BPS_DENOMINATOR: u128 = 10_000;

    /// Hourly emission weight of slot 0 in BPS of the remaining pool,
    /// before the per-day split (0.80% / day).
    pub const PRIMARY_PAIR_BPS: u128 = 80;

    /// Hourly emission weight of slots 1-3 (0.40% / day each).
    pub const SECONDARY_PAIR_BPS: u128 = 40;

    /// The daily BPS weights are split across 24 hourly tranches.
    pub const HOURS_PER_DAY: u128 = 24;

    /// Number of pair registry slots. Slot 0 carries double weight.
    pub const PAIR_SLOTS: usize = 4;

    /// Hour length in milliseconds (the env clock is ms-based).
    pub const HOUR_LENGTH_MS: u64 = 3_600_000;

    /// The null account, rejected wherever a real principal is required.
    pub const ZERO_ADDRESS: [u8; 32] = [0u8; 32];

    // =========================================================================
    // STORAGE
    // =========================================================================

    #[ink(storage)]
    pub struct Diamond {
        // ── Token metadata ────────────────────────────────────────────────
        name: String,
        symbol: String,
        decimals: u8,
        total_supply: Balance,

        // ── Ledger ────────────────────────────────────────────────────────
        balances: Mapping<AccountId, Balance>,
        allowances: Mapping<(AccountId, AccountId), Balance>,

        // ── Access control ────────────────────────────────────────────────
        owner: AccountId,

        // ── Distribution wiring ───────────────────────────────────────────
        /// Destination for staked pair assets. Set at deployment, immutable.
        sink_address: AccountId,
        /// Circulating allocation at deployment; everything above it is the
        /// distribution pool the emission schedule draws down.
        initial_supply: Balance,
        /// Pair registry. `None` marks an unset slot; unset slots are
        /// skipped by the scheduler and emit nothing.
        pairs: [Option<AccountId>; PAIR_SLOTS],

        // ── Hour clock ────────────────────────────────────────────────────
        /// 0 until `start_distribution`; then the open hour, strictly
        /// increasing. Hours below it are settled and withdrawable.
        current_hour: u64,
        start_time: Timestamp,
        next_hour_time: Timestamp,
        hour_length: Timestamp,

        // ── Per-hour tables ───────────────────────────────────────────────
        /// Tranche locked in when an hour closed, keyed `(pair, hour)`.
        hourly_emission: Mapping<(AccountId, u64), Balance>,
        /// Aggregate units staked into `(pair, hour)` by all contributors.
        hourly_units: Mapping<(AccountId, u64), Balance>,
        /// Contributors who staked a nonzero amount into `(pair, hour)`.
        hourly_members: Mapping<(AccountId, u64), Vec<AccountId>>,
        /// Individual claim weight, keyed `(pair, hour, contributor)`.
        /// Zeroed exactly once, by withdrawal; that transition is the
        /// claimed marker.
        units: Mapping<(AccountId, u64, AccountId), Balance>,
        /// Hours a contributor staked into, per pair, append-only and in
        /// contribution order, keyed `(contributor, pair)`.
        hour_history: Mapping<(AccountId, AccountId), Vec<u64>>,

        // ── Running totals ────────────────────────────────────────────────
        total_burnt: Balance,
        total_emitted: Balance,
        total_withdrawn: Balance,
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    #[ink(event)]
    pub struct Transfer {
        #[ink(topic)]
        from: Option<AccountId>,
        #[ink(topic)]
        to: Option<AccountId>,
        value: Balance,
    }

    #[ink(event)]
    pub struct Approval {
        #[ink(topic)]
        owner: AccountId,
        #[ink(topic)]
        spender: AccountId,
        value: Balance,
    }

    /// Emitted when a registry slot is populated or replaced.
    #[ink(event)]
    pub struct PairRegistered {
        index: u32,
        #[ink(topic)]
        asset: AccountId,
    }

    /// Emitted once, when the hour clock starts and hour 1 opens.
    #[ink(event)]
    pub struct DistributionStarted {
        start_time: Timestamp,
        next_hour_time: Timestamp,
    }

    /// Emitted when an hour closes and its emission vector is locked in.
    #[ink(event)]
    pub struct HourSealed {
        #[ink(topic)]
        hour: u64,
        emitted: Balance,
        remaining_pool: Balance,
    }

    /// Emitted for every accepted contribution, including zero-amount ones.
    #[ink(event)]
    pub struct Contributed {
        #[ink(topic)]
        contributor: AccountId,
        #[ink(topic)]
        pair: AccountId,
        hour: u64,
        amount: Balance,
    }

    /// Emitted when a withdrawal pays out a nonzero amount.
    #[ink(event)]
    pub struct RewardsWithdrawn {
        #[ink(topic)]
        contributor: AccountId,
        #[ink(topic)]
        pair: AccountId,
        amount: Balance,
    }

    // =========================================================================
    // ERRORS
    // =========================================================================

    #[derive(Debug, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(feature = "std", derive(scale_info::TypeInfo))]
    pub enum Error {
        /// Caller is not the contract owner.
        NotOwner,
        /// Distribution has not been started yet.
        NotStarted,
        /// `start_distribution` was already executed.
        AlreadyStarted,
        /// `start_distribution` requires at least one populated slot.
        NoPairRegistered,
        /// The referenced asset is not in the pair registry.
        UnknownAsset,
        /// Registry slot index outside `[0, PAIR_SLOTS)`.
        InvalidIndex,
        /// The null account was passed where a real principal is required.
        ZeroAddress,
        /// Sender's $DMD balance is insufficient.
        InsufficientBalance,
        /// Spender's allowance is insufficient.
        InsufficientAllowance,
        /// The pair asset contract rejected the stake pull or forward.
        StakeTransferFailed,
        /// An arithmetic operation overflowed.
        Overflow,
    }

    /// Errors surfaced by a registered pair asset contract.
    #[derive(Debug, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(feature = "std", derive(scale_info::TypeInfo))]
    pub enum AssetError {
        /// The asset contract rejected the transfer.
        TransferRejected,
    }

    // =========================================================================
    // PAIR ASSET INTERFACE (Cross-Contract)
    // =========================================================================

    /// Minimal fungible surface every registered pair asset must expose.
    /// Stakes are pulled with `transfer_from` and forwarded to the sink
    /// with `transfer`.
    #[ink::trait_definition]
    pub trait PairAsset {
        #[ink(message)]
        fn transfer_from(
            &mut self,
            from: AccountId,
            to: AccountId,
            value: Balance,
        ) -> Result<(), AssetError>;

        #[ink(message)]
        fn transfer(&mut self, to: AccountId, value: Balance) -> Result<(), AssetError>;
    }

    // =========================================================================
    // IMPLEMENTATION
    // =========================================================================

    impl Diamond {
        // ---------------------------------------------------------------------
        // Constructor
        // ---------------------------------------------------------------------

        /// Deploy the engine.
        ///
        /// Mints `INITIAL_CIRCULATING` to the deployer and the distribution
        /// pool to the engine's own account. The sink address receives every
        /// staked pair asset and cannot be changed after deployment.
        #[ink(constructor)]
        pub fn new(sink_address: AccountId) -> Self {
            let caller = Self::env().caller();
            let contract = Self::env().account_id();

            let pool = TOTAL_SUPPLY - INITIAL_CIRCULATING;
            let mut balances = Mapping::default();
            balances.insert(caller, &INITIAL_CIRCULATING);
            balances.insert(contract, &pool);

            Self::env().emit_event(Transfer {
                from: None,
                to: Some(caller),
                value: INITIAL_CIRCULATING,
            });
            Self::env().emit_event(Transfer {
                from: None,
                to: Some(contract),
                value: pool,
            });

            Self {
                name: String::from("Diamond"),
                symbol: String::from("DMD"),
                decimals: 18,
                total_supply: TOTAL_SUPPLY,
                balances,
                allowances: Mapping::default(),
                owner: caller,
                sink_address,
                initial_supply: INITIAL_CIRCULATING,
                pairs: [None; PAIR_SLOTS],
                current_hour: 0,
                start_time: 0,
                next_hour_time: 0,
                hour_length: HOUR_LENGTH_MS,
                hourly_emission: Mapping::default(),
                hourly_units: Mapping::default(),
                hourly_members: Mapping::default(),
                units: Mapping::default(),
                hour_history: Mapping::default(),
                total_burnt: 0,
                total_emitted: 0,
                total_withdrawn: 0,
            }
        }

        // =====================================================================
        // STANDARD LEDGER
        // =====================================================================

        #[ink(message)]
        pub fn token_name(&self) -> String {
            self.name.clone()
        }

        #[ink(message)]
        pub fn token_symbol(&self) -> String {
            self.symbol.clone()
        }

        #[ink(message)]
        pub fn token_decimals(&self) -> u8 {
            self.decimals
        }

        #[ink(message)]
        pub fn total_supply(&self) -> Balance {
            self.total_supply
        }

        #[ink(message)]
        pub fn balance_of(&self, account: AccountId) -> Balance {
            self.balances.get(account).unwrap_or(0)
        }

        #[ink(message)]
        pub fn allowance(&self, owner: AccountId, spender: AccountId) -> Balance {
            self.allowances.get((owner, spender)).unwrap_or(0)
        }

        #[ink(message)]
        pub fn transfer(&mut self, to: AccountId, value: Balance) -> Result<(), Error> {
            let from = self.env().caller();
            self.process_transfer(from, to, value)
        }

        #[ink(message)]
        pub fn approve(&mut self, spender: AccountId, value: Balance) -> Result<(), Error> {
            let owner = self.env().caller();
            self.allowances.insert((owner, spender), &value);
            self.env().emit_event(Approval {
                owner,
                spender,
                value,
            });
            Ok(())
        }

        #[ink(message)]
        pub fn transfer_from(
            &mut self,
            from: AccountId,
            to: AccountId,
            value: Balance,
        ) -> Result<(), Error> {
            let caller = self.env().caller();
            let allowance = self.allowance(from, caller);
            if allowance < value {
                return Err(Error::InsufficientAllowance);
            }
            self.allowances.insert((from, caller), &(allowance - value));
            self.process_transfer(from, to, value)
        }

        fn process_transfer(
            &mut self,
            from: AccountId,
            to: AccountId,
            value: Balance,
        ) -> Result<(), Error> {
            self.debit_balance(from, value)?;
            self.credit_balance(to, value)?;
            self.env().emit_event(Transfer {
                from: Some(from),
                to: Some(to),
                value,
            });
            Ok(())
        }

        fn debit_balance(&mut self, account: AccountId, value: Balance) -> Result<(), Error> {
            let balance = self.balance_of(account);
            if balance < value {
                return Err(Error::InsufficientBalance);
            }
            self.balances.insert(account, &(balance - value));
            Ok(())
        }

        fn credit_balance(&mut self, account: AccountId, value: Balance) -> Result<(), Error> {
            let balance = self.balance_of(account);
            let updated = balance.checked_add(value).ok_or(Error::Overflow)?;
            self.balances.insert(account, &updated);
            Ok(())
        }

        // =====================================================================
        // PAIR REGISTRY
        // =====================================================================

        /// Populate (or replace) a registry slot.
        ///
        /// Slot 0 is the primary pair and earns double emission weight.
        /// Replacing a live slot does not touch the old asset's tables;
        /// they stay keyed by asset address and remain withdrawable.
        #[ink(message)]
        pub fn set_pair(&mut self, index: u32, asset: AccountId) -> Result<(), Error> {
            self.only_owner()?;
            if index as usize >= PAIR_SLOTS {
                return Err(Error::InvalidIndex);
            }
            if asset == AccountId::from(ZERO_ADDRESS) {
                return Err(Error::ZeroAddress);
            }
            self.pairs[index as usize] = Some(asset);
            self.env().emit_event(PairRegistered { index, asset });
            Ok(())
        }

        #[ink(message)]
        pub fn get_pair(&self, index: u32) -> Option<AccountId> {
            if (index as usize) < PAIR_SLOTS {
                self.pairs[index as usize]
            } else {
                None
            }
        }

        fn pair_registered(&self, asset: AccountId) -> bool {
            self.pairs.iter().flatten().any(|pair| *pair == asset)
        }

        // =====================================================================
        // HOUR CLOCK
        // =====================================================================

        /// One-shot transition that starts the hour clock.
        ///
        /// Seals the hour-0 baseline tranche through the regular scheduler
        /// (hour 0 can have no contributors, so that tranche is permanently
        /// unclaimable) and opens hour 1.
        #[ink(message)]
        pub fn start_distribution(&mut self) -> Result<(), Error> {
            self.only_owner()?;
            if self.current_hour != 0 {
                return Err(Error::AlreadyStarted);
            }
            if !self.pairs.iter().any(|slot| slot.is_some()) {
                return Err(Error::NoPairRegistered);
            }

            self.seal_emission(0)?;

            let now = self.env().block_timestamp();
            self.current_hour = 1;
            self.start_time = now;
            self.next_hour_time = now.saturating_add(self.hour_length);

            self.env().emit_event(DistributionStarted {
                start_time: now,
                next_hour_time: self.next_hour_time,
            });
            Ok(())
        }

        /// Keeper entry point: run one clock step and return the open hour.
        ///
        /// Anyone may call this. Without it the clock only moves when a
        /// contribution or withdrawal happens to cross a boundary.
        #[ink(message)]
        pub fn tick_hour(&mut self) -> Result<u64, Error> {
            self.advance_if_due()?;
            Ok(self.current_hour)
        }

        /// Advance the clock by at most one hour.
        ///
        /// Seals the closing hour's emission, then opens the next hour and
        /// re-anchors the boundary at `now + hour_length`. Intentionally
        /// processes a single boundary per call: hours that elapse without
        /// any call are skipped and never receive emission.
        fn advance_if_due(&mut self) -> Result<(), Error> {
            if self.current_hour == 0 {
                return Ok(());
            }
            let now = self.env().block_timestamp();
            if now < self.next_hour_time {
                return Ok(());
            }

            self.seal_emission(self.current_hour)?;
            self.current_hour = self.current_hour.saturating_add(1);
            self.next_hour_time = now.saturating_add(self.hour_length);
            Ok(())
        }

        // =====================================================================
        // EMISSION SCHEDULER
        // =====================================================================

        /// Lock in the emission vector for a closing hour.
        ///
        /// ```text
        /// remaining = total_supply − initial_supply − total_emitted
        /// slot 0:    remaining × 80 / 10_000 / 24
        /// slots 1-3: remaining × 40 / 10_000 / 24
        /// ```
        ///
        /// Multiply first, then the two floor divisions, in exactly that
        /// order; reordering changes the rounding and breaks settled
        /// tranches.
        fn seal_emission(&mut self, hour: u64) -> Result<(), Error> {
            let remaining = self
                .total_supply
                .checked_sub(self.initial_supply)
                .and_then(|pool| pool.checked_sub(self.total_emitted))
                .ok_or(Error::Overflow)?;

            let mut emitted: Balance = 0;
            for (slot, entry) in self.pairs.iter().enumerate() {
                if let Some(asset) = entry {
                    let weight = if slot == 0 {
                        PRIMARY_PAIR_BPS
                    } else {
                        SECONDARY_PAIR_BPS
                    };
                    let tranche = remaining.checked_mul(weight).ok_or(Error::Overflow)?
                        / BPS_DENOMINATOR
                        / HOURS_PER_DAY;
                    self.hourly_emission.insert((*asset, hour), &tranche);
                    emitted = emitted.checked_add(tranche).ok_or(Error::Overflow)?;
                }
            }

            self.total_emitted = self.total_emitted.checked_add(emitted).ok_or(Error::Overflow)?;

            self.env().emit_event(HourSealed {
                hour,
                emitted,
                remaining_pool: remaining - emitted,
            });
            Ok(())
        }

        // =====================================================================
        // CONTRIBUTION LEDGER
        // =====================================================================

        /// Stake `amount` of a registered pair asset into the open hour.
        ///
        /// The stake is pulled from the caller and forwarded to the sink,
        /// then credited as claim weight on the open hour's tranche. A
        /// zero amount is accepted and adds nothing anywhere, including
        /// membership.
        #[ink(message)]
        pub fn contribute(&mut self, pair: AccountId, amount: Balance) -> Result<(), Error> {
            self.advance_if_due()?;
            self.assert_started()?;
            if pair == AccountId::from(ZERO_ADDRESS) {
                return Err(Error::ZeroAddress);
            }
            if !self.pair_registered(pair) {
                return Err(Error::UnknownAsset);
            }

            let caller = self.env().caller();
            if amount > 0 {
                self.collect_stake(pair, caller, amount)?;
            }

            let hour = self.current_hour;
            let staked = self.units.get((pair, hour, caller)).unwrap_or(0);
            if staked == 0 && amount > 0 {
                // First nonzero stake this hour: register membership and
                // extend the contributor's hour history.
                let mut history = self.hour_history.get((caller, pair)).unwrap_or_default();
                history.push(hour);
                self.hour_history.insert((caller, pair), &history);

                let mut members = self.hourly_members.get((pair, hour)).unwrap_or_default();
                members.push(caller);
                self.hourly_members.insert((pair, hour), &members);
            }

            let updated = staked.checked_add(amount).ok_or(Error::Overflow)?;
            self.units.insert((pair, hour, caller), &updated);

            let aggregate = self.hourly_units.get((pair, hour)).unwrap_or(0);
            let aggregate = aggregate.checked_add(amount).ok_or(Error::Overflow)?;
            self.hourly_units.insert((pair, hour), &aggregate);

            self.total_burnt = self.total_burnt.checked_add(amount).ok_or(Error::Overflow)?;

            self.env().emit_event(Contributed {
                contributor: caller,
                pair,
                hour,
                amount,
            });

            // Second clock step: a due boundary seals here rather than
            // waiting for the next entry point.
            self.advance_if_due()?;
            Ok(())
        }

        /// Pull `amount` of the pair asset from the contributor and forward
        /// it to the sink address.
        fn collect_stake(
            &mut self,
            pair: AccountId,
            from: AccountId,
            amount: Balance,
        ) -> Result<(), Error> {
            // The off-chain test engine cannot dispatch contract calls;
            // the accounting around the pull is exercised directly in tests.
            if cfg!(test) {
                return Ok(());
            }

            let pulled = build_call::<DefaultEnvironment>()
                .call(pair)
                .exec_input(
                    ExecutionInput::new(Selector::new(ink::selector_bytes!("transfer_from")))
                        .push_arg(from)
                        .push_arg(self.env().account_id())
                        .push_arg(amount),
                )
                .returns::<Result<(), AssetError>>()
                .try_invoke();
            if !matches!(pulled, Ok(Ok(Ok(())))) {
                return Err(Error::StakeTransferFailed);
            }

            let forwarded = build_call::<DefaultEnvironment>()
                .call(pair)
                .exec_input(
                    ExecutionInput::new(Selector::new(ink::selector_bytes!("transfer")))
                        .push_arg(self.sink_address)
                        .push_arg(amount),
                )
                .returns::<Result<(), AssetError>>()
                .try_invoke();
            if !matches!(forwarded, Ok(Ok(Ok(())))) {
                return Err(Error::StakeTransferFailed);
            }
            Ok(())
        }

        // =====================================================================
        // REWARD ACCRUAL & WITHDRAWAL
        // =====================================================================

        /// Withdraw every settled, unclaimed hour in the caller's history
        /// for `pair`, oldest first. Returns the total paid. Unsettled and
        /// already-claimed hours contribute 0 and are not errors.
        #[ink(message)]
        pub fn withdraw(&mut self, pair: AccountId) -> Result<Balance, Error> {
            self.advance_if_due()?;
            self.assert_started()?;
            if !self.pair_registered(pair) {
                return Err(Error::UnknownAsset);
            }

            let caller = self.env().caller();
            let history = self.hour_history.get((caller, pair)).unwrap_or_default();

            let mut paid: Balance = 0;
            for hour in history {
                let share = self.settle_hour(caller, pair, hour)?;
                paid = paid.checked_add(share).ok_or(Error::Overflow)?;
            }

            if paid > 0 {
                self.env().emit_event(RewardsWithdrawn {
                    contributor: caller,
                    pair,
                    amount: paid,
                });
            }
            Ok(paid)
        }

        /// Withdraw a single settled hour. A request for the still-open
        /// hour returns 0 rather than failing.
        #[ink(message)]
        pub fn withdraw_hour(&mut self, pair: AccountId, hour: u64) -> Result<Balance, Error> {
            self.advance_if_due()?;
            self.assert_started()?;
            if !self.pair_registered(pair) {
                return Err(Error::UnknownAsset);
            }

            let caller = self.env().caller();
            let paid = self.settle_hour(caller, pair, hour)?;

            if paid > 0 {
                self.env().emit_event(RewardsWithdrawn {
                    contributor: caller,
                    pair,
                    amount: paid,
                });
            }
            Ok(paid)
        }

        /// Settle one `(pair, hour)` claim for `caller`.
        ///
        /// The claim is zeroed before any value moves; the zero-units
        /// transition is the sole double-payment guard
        /// (checks-effects-interactions).
        fn settle_hour(
            &mut self,
            caller: AccountId,
            pair: AccountId,
            hour: u64,
        ) -> Result<Balance, Error> {
            self.advance_if_due()?;
            if hour >= self.current_hour {
                // Still open: no emission sealed yet, silently skipped.
                return Ok(0);
            }
            let staked = self.units.get((pair, hour, caller)).unwrap_or(0);
            if staked == 0 {
                // Never contributed, or already claimed.
                return Ok(0);
            }

            let share = self.clamped_share(pair, hour, caller)?;

            self.units.insert((pair, hour, caller), &0u128);
            self.total_withdrawn = self
                .total_withdrawn
                .checked_add(share)
                .ok_or(Error::Overflow)?;

            if share > 0 {
                let contract = self.env().account_id();
                self.debit_balance(contract, share)?;
                self.credit_balance(caller, share)?;
                self.env().emit_event(Transfer {
                    from: Some(contract),
                    to: Some(caller),
                    value: share,
                });
            }
            Ok(share)
        }

        /// Pro-rata share of a sealed hour, clamped by what the engine
        /// actually holds.
        ///
        /// The clamp prevents insolvency if the engine's balance was
        /// drained below the nominal tranche; it is not proportional
        /// rationing, so first claimants of a depleted hour can exhaust
        /// the balance before later ones.
        fn clamped_share(
            &self,
            pair: AccountId,
            hour: u64,
            account: AccountId,
        ) -> Result<Balance, Error> {
            let staked = self.units.get((pair, hour, account)).unwrap_or(0);
            if staked == 0 {
                return Ok(0);
            }
            let total_units = self.hourly_units.get((pair, hour)).unwrap_or(0);
            if total_units == 0 {
                return Ok(0);
            }

            let sealed = self.hourly_emission.get((pair, hour)).unwrap_or(0);
            let available = self.balance_of(self.env().account_id());
            let emission = if sealed > available { available } else { sealed };

            Ok(emission.checked_mul(staked).ok_or(Error::Overflow)? / total_units)
        }

        // =====================================================================
        // VIEW FUNCTIONS
        // =====================================================================

        /// Preview the share a withdrawal of `(pair, hour)` would pay
        /// `account` right now, including the balance clamp.
        #[ink(message)]
        pub fn emission_share(
            &self,
            pair: AccountId,
            hour: u64,
            account: AccountId,
        ) -> Balance {
            self.clamped_share(pair, hour, account).unwrap_or(0)
        }

        /// Sum of `account`'s unclaimed shares over every settled hour in
        /// its history for `pair`.
        ///
        /// Uses the unclamped sealed tranches, so this is an upper bound
        /// on what a withdrawal actually pays if the engine's balance has
        /// been depleted.
        #[ink(message)]
        pub fn pending_rewards(&self, account: AccountId, pair: AccountId) -> Balance {
            let history = self.hour_history.get((account, pair)).unwrap_or_default();

            let mut pending: Balance = 0;
            for hour in history {
                if hour >= self.current_hour {
                    continue;
                }
                let staked = self.units.get((pair, hour, account)).unwrap_or(0);
                if staked == 0 {
                    continue;
                }
                let total_units = self.hourly_units.get((pair, hour)).unwrap_or(0);
                if total_units == 0 {
                    continue;
                }
                let sealed = self.hourly_emission.get((pair, hour)).unwrap_or(0);
                pending = pending.saturating_add(sealed.saturating_mul(staked) / total_units);
            }
            pending
        }

        /// Number of distinct hours `account` has contributed to for `pair`.
        #[ink(message)]
        pub fn hours_contributed(&self, account: AccountId, pair: AccountId) -> u32 {
            self.hour_history
                .get((account, pair))
                .map(|history| history.len() as u32)
                .unwrap_or(0)
        }

        #[ink(message)]
        pub fn units_of(&self, pair: AccountId, hour: u64, account: AccountId) -> Balance {
            self.units.get((pair, hour, account)).unwrap_or(0)
        }

        #[ink(message)]
        pub fn hour_units(&self, pair: AccountId, hour: u64) -> Balance {
            self.hourly_units.get((pair, hour)).unwrap_or(0)
        }

        #[ink(message)]
        pub fn hour_member_count(&self, pair: AccountId, hour: u64) -> u32 {
            self.hourly_members
                .get((pair, hour))
                .map(|members| members.len() as u32)
                .unwrap_or(0)
        }

        #[ink(message)]
        pub fn emission_of(&self, pair: AccountId, hour: u64) -> Balance {
            self.hourly_emission.get((pair, hour)).unwrap_or(0)
        }

        #[ink(message)]
        pub fn current_hour(&self) -> u64 {
            self.current_hour
        }

        #[ink(message)]
        pub fn start_time(&self) -> Timestamp {
            self.start_time
        }

        #[ink(message)]
        pub fn next_hour_time(&self) -> Timestamp {
            self.next_hour_time
        }

        #[ink(message)]
        pub fn sink_address(&self) -> AccountId {
            self.sink_address
        }

        #[ink(message)]
        pub fn total_burnt(&self) -> Balance {
            self.total_burnt
        }

        #[ink(message)]
        pub fn total_emitted(&self) -> Balance {
            self.total_emitted
        }

        #[ink(message)]
        pub fn total_withdrawn(&self) -> Balance {
            self.total_withdrawn
        }

        // =====================================================================
        // ACCESS CONTROL
        // =====================================================================

        fn only_owner(&self) -> Result<(), Error> {
            if self.env().caller() != self.owner {
                return Err(Error::NotOwner);
            }
            Ok(())
        }

        fn assert_started(&self) -> Result<(), Error> {
            if self.current_hour == 0 {
                return Err(Error::NotStarted);
            }
            Ok(())
        }
    }

    // =========================================================================
    // UNIT TESTS
    // =========================================================================

    #[cfg(test)]
    mod tests {
        use super::*;
        use ink::env::{test, DefaultEnvironment};

        type Env = DefaultEnvironment;

        /// Distribution pool held by the engine at deployment.
        const POOL: Balance = TOTAL_SUPPLY - INITIAL_CIRCULATING;

        fn accounts() -> test::DefaultAccounts<Env> {
            test::default_accounts::<Env>()
        }

        fn set_caller(addr: AccountId) {
            test::set_caller::<Env>(addr);
        }

        fn set_time(ts: Timestamp) {
            test::set_block_timestamp::<Env>(ts);
        }

        fn contract_id() -> AccountId {
            test::callee::<Env>()
        }

        fn deploy() -> Diamond {
            let accs = accounts();
            set_caller(accs.alice);
            // Pin the engine's own account away from the default accounts
            // so the deployer and pool balances never share a key.
            test::set_callee::<Env>(AccountId::from([0xEE; 32]));
            set_time(0);
            // frank plays the sink address.
            Diamond::new(accs.frank)
        }

        /// Deploy, register eve as the primary pair, start the clock.
        fn deploy_started() -> (Diamond, AccountId) {
            let mut engine = deploy();
            let accs = accounts();
            let pair = accs.eve;
            engine.set_pair(0, pair).unwrap();
            engine.start_distribution().unwrap();
            (engine, pair)
        }

        /// Cross `n` hour boundaries, one keeper tick per boundary.
        fn cross_hours(engine: &mut Diamond, n: u64) {
            for _ in 0..n {
                set_time(engine.next_hour_time());
                engine.tick_hour().unwrap();
            }
        }

        /// The scheduler's tranche formula, reproduced independently.
        fn tranche(remaining: Balance, weight_bps: u128) -> Balance {
            remaining * weight_bps / BPS_DENOMINATOR / HOURS_PER_DAY
        }

        // ── Ledger ────────────────────────────────────────────────────────

        #[ink::test]
        fn constructor_splits_supply() {
            let engine = deploy();
            let accs = accounts();
            assert_eq!(engine.total_supply(), TOTAL_SUPPLY);
            assert_eq!(engine.balance_of(accs.alice), INITIAL_CIRCULATING);
            assert_eq!(engine.balance_of(contract_id()), POOL);
        }

        #[ink::test]
        fn transfer_moves_balance() {
            let mut engine = deploy();
            let accs = accounts();
            engine.transfer(accs.bob, 500).unwrap();
            assert_eq!(engine.balance_of(accs.bob), 500);
            assert_eq!(
                engine.balance_of(accs.alice),
                INITIAL_CIRCULATING - 500
            );
        }

        #[ink::test]
        fn transfer_rejects_insufficient_balance() {
            let mut engine = deploy();
            let accs = accounts();
            set_caller(accs.bob); // bob holds nothing
            assert_eq!(
                engine.transfer(accs.charlie, 1),
                Err(Error::InsufficientBalance)
            );
        }

        #[ink::test]
        fn transfer_from_consumes_allowance() {
            let mut engine = deploy();
            let accs = accounts();
            engine.approve(accs.bob, 300).unwrap();

            set_caller(accs.bob);
            engine.transfer_from(accs.alice, accs.charlie, 200).unwrap();
            assert_eq!(engine.balance_of(accs.charlie), 200);
            assert_eq!(engine.allowance(accs.alice, accs.bob), 100);

            // Remaining allowance no longer covers this.
            assert_eq!(
                engine.transfer_from(accs.alice, accs.charlie, 101),
                Err(Error::InsufficientAllowance)
            );
        }

        // ── Pair registry ─────────────────────────────────────────────────

        #[ink::test]
        fn set_pair_rejects_non_owner() {
            let mut engine = deploy();
            let accs = accounts();
            set_caller(accs.bob);
            assert_eq!(engine.set_pair(0, accs.eve), Err(Error::NotOwner));
        }

        #[ink::test]
        fn set_pair_rejects_bad_index() {
            let mut engine = deploy();
            let accs = accounts();
            assert_eq!(engine.set_pair(4, accs.eve), Err(Error::InvalidIndex));
        }

        #[ink::test]
        fn set_pair_rejects_zero_address() {
            let mut engine = deploy();
            assert_eq!(
                engine.set_pair(0, AccountId::from(ZERO_ADDRESS)),
                Err(Error::ZeroAddress)
            );
        }

        #[ink::test]
        fn set_pair_populates_slot() {
            let mut engine = deploy();
            let accs = accounts();
            engine.set_pair(2, accs.eve).unwrap();
            assert_eq!(engine.get_pair(2), Some(accs.eve));
            assert_eq!(engine.get_pair(0), None);
            assert_eq!(engine.get_pair(9), None);
        }

        // ── Start transition ──────────────────────────────────────────────

        #[ink::test]
        fn start_requires_a_pair() {
            let mut engine = deploy();
            assert_eq!(
                engine.start_distribution(),
                Err(Error::NoPairRegistered)
            );
        }

        #[ink::test]
        fn start_rejects_non_owner() {
            let mut engine = deploy();
            let accs = accounts();
            engine.set_pair(0, accs.eve).unwrap();
            set_caller(accs.bob);
            assert_eq!(engine.start_distribution(), Err(Error::NotOwner));
        }

        #[ink::test]
        fn start_seals_hour_zero_baseline() {
            let (engine, pair) = deploy_started();
            let expected = tranche(POOL, PRIMARY_PAIR_BPS);
            assert_eq!(engine.current_hour(), 1);
            assert_eq!(engine.emission_of(pair, 0), expected);
            assert_eq!(engine.total_emitted(), expected);
            assert_eq!(engine.next_hour_time(), HOUR_LENGTH_MS);
        }

        #[ink::test]
        fn start_twice_rejected() {
            let (mut engine, _) = deploy_started();
            assert_eq!(engine.start_distribution(), Err(Error::AlreadyStarted));
        }

        #[ink::test]
        fn secondary_slots_emit_half_weight() {
            let mut engine = deploy();
            let accs = accounts();
            engine.set_pair(0, accs.eve).unwrap();
            engine.set_pair(1, accs.django).unwrap();
            engine.start_distribution().unwrap();

            let primary = tranche(POOL, PRIMARY_PAIR_BPS);
            let secondary = tranche(POOL, SECONDARY_PAIR_BPS);
            assert_eq!(engine.emission_of(accs.eve, 0), primary);
            assert_eq!(engine.emission_of(accs.django, 0), secondary);
            assert_eq!(engine.total_emitted(), primary + secondary);
        }

        // ── Hour clock ────────────────────────────────────────────────────

        #[ink::test]
        fn clock_is_idempotent_within_the_hour() {
            let (mut engine, _) = deploy_started();
            set_time(HOUR_LENGTH_MS - 1);
            engine.tick_hour().unwrap();
            engine.tick_hour().unwrap();
            assert_eq!(engine.current_hour(), 1);
        }

        #[ink::test]
        fn clock_advances_exactly_one_hour_per_call() {
            let (mut engine, pair) = deploy_started();

            // Three boundaries elapse, but a single call advances once.
            set_time(3 * HOUR_LENGTH_MS);
            assert_eq!(engine.tick_hour().unwrap(), 2);

            // The boundary was re-anchored at now + hour_length, so an
            // immediate second tick is a no-op: the skipped hours are gone.
            assert_eq!(engine.tick_hour().unwrap(), 2);
            assert_eq!(engine.emission_of(pair, 2), 0);
            assert_eq!(engine.next_hour_time(), 4 * HOUR_LENGTH_MS);
        }

        #[ink::test]
        fn emission_decays_hour_over_hour() {
            let (mut engine, pair) = deploy_started();
            cross_hours(&mut engine, 2);

            let e0 = tranche(POOL, PRIMARY_PAIR_BPS);
            let e1 = tranche(POOL - e0, PRIMARY_PAIR_BPS);
            let e2 = tranche(POOL - e0 - e1, PRIMARY_PAIR_BPS);

            assert_eq!(engine.emission_of(pair, 0), e0);
            assert_eq!(engine.emission_of(pair, 1), e1);
            assert_eq!(engine.emission_of(pair, 2), e2);
            assert!(e1 < e0);
            assert!(e2 < e1);
            assert_eq!(engine.total_emitted(), e0 + e1 + e2);
        }

        // ── Contribution ledger ───────────────────────────────────────────

        #[ink::test]
        fn contribute_requires_started() {
            let mut engine = deploy();
            let accs = accounts();
            engine.set_pair(0, accs.eve).unwrap();
            assert_eq!(
                engine.contribute(accs.eve, 100),
                Err(Error::NotStarted)
            );
        }

        #[ink::test]
        fn contribute_rejects_unknown_asset() {
            let (mut engine, _) = deploy_started();
            let accs = accounts();
            assert_eq!(
                engine.contribute(accs.django, 100),
                Err(Error::UnknownAsset)
            );
        }

        #[ink::test]
        fn contribute_rejects_zero_address() {
            let (mut engine, _) = deploy_started();
            assert_eq!(
                engine.contribute(AccountId::from(ZERO_ADDRESS), 100),
                Err(Error::ZeroAddress)
            );
        }

        #[ink::test]
        fn contribute_records_units_and_membership() {
            let (mut engine, pair) = deploy_started();
            let accs = accounts();

            set_caller(accs.bob);
            engine.contribute(pair, 100).unwrap();
            assert_eq!(engine.units_of(pair, 1, accs.bob), 100);
            assert_eq!(engine.hour_units(pair, 1), 100);
            assert_eq!(engine.hour_member_count(pair, 1), 1);
            assert_eq!(engine.hours_contributed(accs.bob, pair), 1);
            assert_eq!(engine.total_burnt(), 100);

            // A second stake in the same hour accumulates without
            // duplicating membership or history.
            engine.contribute(pair, 50).unwrap();
            assert_eq!(engine.units_of(pair, 1, accs.bob), 150);
            assert_eq!(engine.hour_units(pair, 1), 150);
            assert_eq!(engine.hour_member_count(pair, 1), 1);
            assert_eq!(engine.hours_contributed(accs.bob, pair), 1);
            assert_eq!(engine.total_burnt(), 150);
        }

        #[ink::test]
        fn zero_amount_contribution_is_inert() {
            let (mut engine, pair) = deploy_started();
            let accs = accounts();
            set_caller(accs.bob);
            engine.contribute(pair, 0).unwrap();
            assert_eq!(engine.units_of(pair, 1, accs.bob), 0);
            assert_eq!(engine.hour_units(pair, 1), 0);
            assert_eq!(engine.hour_member_count(pair, 1), 0);
            assert_eq!(engine.hours_contributed(accs.bob, pair), 0);
            assert_eq!(engine.total_burnt(), 0);
        }

        #[ink::test]
        fn contribution_lands_after_clock_advance() {
            let (mut engine, pair) = deploy_started();
            let accs = accounts();

            // A boundary elapsed before this call, so the clock advances
            // first and the stake lands in the newly opened hour 2.
            set_time(HOUR_LENGTH_MS);
            set_caller(accs.bob);
            engine.contribute(pair, 100).unwrap();

            assert_eq!(engine.current_hour(), 2);
            assert_eq!(engine.units_of(pair, 1, accs.bob), 0);
            assert_eq!(engine.units_of(pair, 2, accs.bob), 100);
        }

        #[ink::test]
        fn hours_contributed_counts_distinct_hours() {
            let (mut engine, pair) = deploy_started();
            let accs = accounts();

            set_caller(accs.bob);
            engine.contribute(pair, 10).unwrap();
            cross_hours(&mut engine, 1);
            set_caller(accs.bob);
            engine.contribute(pair, 10).unwrap();
            engine.contribute(pair, 10).unwrap();

            assert_eq!(engine.hours_contributed(accs.bob, pair), 2);
        }

        // ── Accrual & withdrawal ──────────────────────────────────────────

        #[ink::test]
        fn single_contributor_takes_full_tranche() {
            let (mut engine, pair) = deploy_started();
            let accs = accounts();

            set_caller(accs.bob);
            engine.contribute(pair, 100).unwrap();
            cross_hours(&mut engine, 1);

            let e0 = tranche(POOL, PRIMARY_PAIR_BPS);
            let e1 = tranche(POOL - e0, PRIMARY_PAIR_BPS);

            // units / total_units = 1, so the whole hour-1 tranche accrues.
            assert_eq!(engine.pending_rewards(accs.bob, pair), e1);

            set_caller(accs.bob);
            let paid = engine.withdraw(pair).unwrap();
            assert_eq!(paid, e1);
            assert_eq!(engine.balance_of(accs.bob), e1);
            assert_eq!(engine.balance_of(contract_id()), POOL - e1);
            assert_eq!(engine.total_withdrawn(), e1);
            assert_eq!(engine.pending_rewards(accs.bob, pair), 0);

            // Second withdrawal pays exactly 0.
            assert_eq!(engine.withdraw(pair).unwrap(), 0);
            assert_eq!(engine.balance_of(accs.bob), e1);
            assert_eq!(engine.total_withdrawn(), e1);
        }

        #[ink::test]
        fn pro_rata_split_rounds_down() {
            let (mut engine, pair) = deploy_started();
            let accs = accounts();

            set_caller(accs.bob);
            engine.contribute(pair, 30).unwrap();
            set_caller(accs.charlie);
            engine.contribute(pair, 70).unwrap();
            cross_hours(&mut engine, 1);

            let e0 = tranche(POOL, PRIMARY_PAIR_BPS);
            let e1 = tranche(POOL - e0, PRIMARY_PAIR_BPS);
            let bob_share = e1 * 30 / 100;
            let charlie_share = e1 * 70 / 100;

            // Preview matches what the withdrawal then pays.
            assert_eq!(engine.emission_share(pair, 1, accs.bob), bob_share);
            assert_eq!(engine.emission_share(pair, 1, accs.charlie), charlie_share);

            set_caller(accs.bob);
            assert_eq!(engine.withdraw(pair).unwrap(), bob_share);
            set_caller(accs.charlie);
            assert_eq!(engine.withdraw(pair).unwrap(), charlie_share);

            // Floor division may shed dust, never overshoot.
            assert!(bob_share + charlie_share <= e1);
            assert_eq!(engine.total_withdrawn(), bob_share + charlie_share);
        }

        #[ink::test]
        fn open_hour_withdrawal_pays_nothing() {
            let (mut engine, pair) = deploy_started();
            let accs = accounts();

            set_caller(accs.bob);
            engine.contribute(pair, 100).unwrap();

            // Hour 1 is still open: skipped, not an error, no transfer,
            // and the claim stays intact.
            assert_eq!(engine.withdraw_hour(pair, 1).unwrap(), 0);
            assert_eq!(engine.balance_of(accs.bob), 0);
            assert_eq!(engine.units_of(pair, 1, accs.bob), 100);
            assert_eq!(engine.pending_rewards(accs.bob, pair), 0);
        }

        #[ink::test]
        fn withdraw_hour_settles_only_that_hour() {
            let (mut engine, pair) = deploy_started();
            let accs = accounts();

            set_caller(accs.bob);
            engine.contribute(pair, 100).unwrap();
            cross_hours(&mut engine, 1);
            set_caller(accs.bob);
            engine.contribute(pair, 100).unwrap();
            cross_hours(&mut engine, 1);

            let e0 = tranche(POOL, PRIMARY_PAIR_BPS);
            let e1 = tranche(POOL - e0, PRIMARY_PAIR_BPS);
            let e2 = tranche(POOL - e0 - e1, PRIMARY_PAIR_BPS);

            set_caller(accs.bob);
            assert_eq!(engine.withdraw_hour(pair, 1).unwrap(), e1);
            assert_eq!(engine.units_of(pair, 1, accs.bob), 0);
            assert_eq!(engine.pending_rewards(accs.bob, pair), e2);

            // The all-hours variant picks up the remaining hour 2 claim;
            // the already-claimed hour 1 contributes 0.
            assert_eq!(engine.withdraw(pair).unwrap(), e2);
            assert_eq!(engine.balance_of(accs.bob), e1 + e2);
        }

        #[ink::test]
        fn withdraw_rejects_unknown_asset() {
            let (mut engine, _) = deploy_started();
            let accs = accounts();
            set_caller(accs.bob);
            assert_eq!(engine.withdraw(accs.django), Err(Error::UnknownAsset));
            assert_eq!(
                engine.withdraw_hour(accs.django, 1),
                Err(Error::UnknownAsset)
            );
        }

        #[ink::test]
        fn pending_skips_the_open_hour() {
            let (mut engine, pair) = deploy_started();
            let accs = accounts();
            set_caller(accs.bob);
            engine.contribute(pair, 100).unwrap();
            assert_eq!(engine.pending_rewards(accs.bob, pair), 0);
            cross_hours(&mut engine, 1);
            assert!(engine.pending_rewards(accs.bob, pair) > 0);
        }

        #[ink::test]
        fn conservation_holds_across_a_busy_run() {
            let (mut engine, pair) = deploy_started();
            let accs = accounts();

            for _ in 0..3 {
                set_caller(accs.bob);
                engine.contribute(pair, 40).unwrap();
                set_caller(accs.charlie);
                engine.contribute(pair, 60).unwrap();
                cross_hours(&mut engine, 1);
            }

            set_caller(accs.bob);
            engine.withdraw(pair).unwrap();
            set_caller(accs.charlie);
            engine.withdraw(pair).unwrap();

            assert!(engine.total_emitted() <= TOTAL_SUPPLY - INITIAL_CIRCULATING);
            assert!(engine.total_withdrawn() <= engine.total_emitted());
            assert_eq!(engine.total_burnt(), 300);

            // Every token paid out came off the engine's own balance.
            assert_eq!(
                engine.balance_of(contract_id()),
                POOL - engine.total_withdrawn()
            );
        }
    }
}
