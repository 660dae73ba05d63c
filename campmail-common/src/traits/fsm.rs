/// A state that consumes one input at a time.
///
/// Transitions do no I/O. Anything the driver has to do next is recorded in
/// `Context`, which the driver inspects after every call.
pub trait FiniteStateMachine {
    type Input;
    type Context;

    #[must_use]
    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self;

    /// Whether no further input will be accepted.
    fn is_terminal(&self) -> bool;
}
