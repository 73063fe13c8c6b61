use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// A single two-phase participant in a transition: `prepare` may veto, `commit` finalizes,
/// `rollback` undoes whatever `prepare` did if the overall transition is rejected.
pub struct TransitionHandler<S> {
	pub name: &'static str,
	prepare: Box<dyn FnMut(&S, &S) -> Result<(), String> + Send>,
	commit: Box<dyn FnMut(&S, &S) + Send>,
	rollback: Box<dyn FnMut(&S, &S) + Send>,
}

impl<S> TransitionHandler<S> {
	pub fn new<P, C, R>(name: &'static str, prepare: P, commit: C, rollback: R) -> Self
	where
		P: FnMut(&S, &S) -> Result<(), String> + Send + 'static,
		C: FnMut(&S, &S) + Send + 'static,
		R: FnMut(&S, &S) + Send + 'static,
	{
		Self {
			name,
			prepare: Box::new(prepare),
			commit: Box::new(commit),
			rollback: Box::new(rollback),
		}
	}
}

#[derive(Debug, Clone)]
pub struct TransitionFailure<S> {
	pub from: S,
	pub to: S,
	pub reasons: Vec<String>,
}

#[derive(Debug)]
pub enum TransitionOutcome<S> {
	/// The transition matrix does not permit `from -> to`.
	Illegal { from: S, to: S },
	/// A transition was attempted while another was already in flight.
	Reentrant,
	/// The matrix permitted the move but at least one prepare handler vetoed it;
	/// already-prepared handlers were rolled back in reverse order.
	Rejected(TransitionFailure<S>),
}

#[derive(Clone, Copy)]
enum Scope {
	Outbound,
	Universal,
	Inbound,
	Pair,
}

const PHASES: [Scope; 4] = [Scope::Outbound, Scope::Universal, Scope::Inbound, Scope::Pair];

/// Generic N-state machine: legal moves come from a transition matrix, handlers are
/// two-phase-commit participants registered per-pair, per-outbound-state, per-inbound-state,
/// or universally. `follow_on_state` and `state_method` are both keyed per-state (not per
/// transition): landing on a state runs that state's method, then if its follow-on state
/// differs from itself, the machine recursively transitions into it.
pub struct StateMachine<S: Eq + Hash + Clone + Debug> {
	states: Vec<S>,
	current: S,
	transition_matrix: HashMap<S, Vec<S>>,
	follow_on: HashMap<S, S>,
	state_methods: HashMap<S, Box<dyn FnMut(&S) + Send>>,
	pair_handlers: HashMap<(S, S), Vec<TransitionHandler<S>>>,
	outbound_handlers: HashMap<S, Vec<TransitionHandler<S>>>,
	inbound_handlers: HashMap<S, Vec<TransitionHandler<S>>>,
	universal_handlers: Vec<TransitionHandler<S>>,
	is_transitioning: bool,
}

impl<S: Eq + Hash + Clone + Debug> StateMachine<S> {
	#[must_use]
	pub fn new(states: Vec<S>, initial: S) -> Self {
		Self {
			states,
			current: initial,
			transition_matrix: HashMap::new(),
			follow_on: HashMap::new(),
			state_methods: HashMap::new(),
			pair_handlers: HashMap::new(),
			outbound_handlers: HashMap::new(),
			inbound_handlers: HashMap::new(),
			universal_handlers: Vec::new(),
			is_transitioning: false,
		}
	}

	#[must_use]
	pub const fn current(&self) -> &S {
		&self.current
	}

	#[must_use]
	pub const fn is_transitioning(&self) -> bool {
		self.is_transitioning
	}

	#[must_use]
	pub fn states(&self) -> &[S] {
		&self.states
	}

	pub fn allow_transition(&mut self, from: S, to: S) {
		self.transition_matrix.entry(from).or_default().push(to);
	}

	/// Registers `state`'s follow-on: once the machine lands on `state`, it immediately
	/// attempts to transition into `lands_on`. Pass `state.clone()` as `lands_on` (or simply
	/// never register an entry) to mark `state` quiescent.
	pub fn set_follow_on(&mut self, state: S, lands_on: S) {
		self.follow_on.insert(state, lands_on);
	}

	/// Registers the entry action run every time the machine lands on `state`, before any
	/// follow-on transition is attempted.
	pub fn set_state_method(&mut self, state: S, method: impl FnMut(&S) + Send + 'static) {
		self.state_methods.insert(state, Box::new(method));
	}

	pub fn on_pair(&mut self, from: S, to: S, handler: TransitionHandler<S>) {
		self.pair_handlers.entry((from, to)).or_default().push(handler);
	}

	pub fn on_outbound(&mut self, from: S, handler: TransitionHandler<S>) {
		self.outbound_handlers.entry(from).or_default().push(handler);
	}

	pub fn on_inbound(&mut self, to: S, handler: TransitionHandler<S>) {
		self.inbound_handlers.entry(to).or_default().push(handler);
	}

	pub fn on_universal(&mut self, handler: TransitionHandler<S>) {
		self.universal_handlers.push(handler);
	}

	#[must_use]
	fn is_legal(&self, from: &S, to: &S) -> bool {
		self.transition_matrix.get(from).is_some_and(|allowed| allowed.contains(to))
	}

	fn handlers_mut(&mut self, scope: Scope, from: &S, to: &S) -> &mut [TransitionHandler<S>] {
		match scope {
			Scope::Universal => self.universal_handlers.as_mut_slice(),
			Scope::Outbound => self.outbound_handlers.get_mut(from).map_or(&mut [][..], Vec::as_mut_slice),
			Scope::Inbound => self.inbound_handlers.get_mut(to).map_or(&mut [][..], Vec::as_mut_slice),
			Scope::Pair => self.pair_handlers.get_mut(&(from.clone(), to.clone())).map_or(&mut [][..], Vec::as_mut_slice),
		}
	}

	fn run_state_method(&mut self, state: &S) {
		if let Some(method) = self.state_methods.get_mut(state) {
			method(state);
		}
	}

	/// Attempts to move to `to`. Guards against re-entrancy for the whole call, including any
	/// follow-on hops it cascades into.
	pub fn transition(&mut self, to: S) -> Result<S, TransitionOutcome<S>> {
		if self.is_transitioning {
			return Err(TransitionOutcome::Reentrant);
		}
		self.is_transitioning = true;
		let outcome = self.drive(to);
		self.is_transitioning = false;
		outcome
	}

	/// One matrix-checked, two-phase hop: Prepare (every handler, in outbound/universal/
	/// inbound/pair order, failures accumulated rather than short-circuited) -> on any failure,
	/// Rollback the handlers that did prepare, in reverse order, and return the accumulated
	/// reasons -> otherwise Commit every handler, land on `to`, run its state method, and if
	/// `follow_on_state[to] != to`, recurse into it.
	fn drive(&mut self, to: S) -> Result<S, TransitionOutcome<S>> {
		let from = self.current.clone();
		if !self.is_legal(&from, &to) {
			return Err(TransitionOutcome::Illegal { from, to });
		}

		let mut prepared: Vec<(Scope, usize)> = Vec::new();
		let mut reasons = Vec::new();

		for scope in PHASES {
			let handlers = self.handlers_mut(scope, &from, &to);
			for (idx, handler) in handlers.iter_mut().enumerate() {
				match (handler.prepare)(&from, &to) {
					Ok(()) => prepared.push((scope, idx)),
					Err(reason) => reasons.push(reason),
				}
			}
		}

		if !reasons.is_empty() {
			for (scope, idx) in prepared.into_iter().rev() {
				let handlers = self.handlers_mut(scope, &from, &to);
				(handlers[idx].rollback)(&from, &to);
			}
			return Err(TransitionOutcome::Rejected(TransitionFailure { from, to, reasons }));
		}

		for scope in PHASES {
			let handlers = self.handlers_mut(scope, &from, &to);
			for handler in handlers.iter_mut() {
				(handler.commit)(&from, &to);
			}
		}

		self.current = to.clone();
		self.run_state_method(&to);

		match self.follow_on.get(&to).cloned() {
			Some(next) if next != to => self.drive(next),
			_ => Ok(to),
		}
	}
}
