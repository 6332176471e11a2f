//! # Action Records
//!
//! An action record is one registered operation: the function that runs on a
//! pool thread and the callbacks that receive its outcome on the owner thread.
//!
//! ## Key Concepts
//! - **Get**: `(I) -> Option<T>`, the result callback receives every outcome
//! - **Set**: `(T) -> ()`, only failures are delivered
//! - **Void**: `() -> ()`, only failures are delivered
//!
//! ## Design Principles
//! - Records are immutable once registered and shared by every work unit of
//!   the same action
//! - `invoke` may run many times for one logical request; `deliver` runs once
//! - Without an error sink a Get record reports failures through its result
//!   callback, while Set and Void records log and drop them

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use courier_api::{
    ActionError, ActionId, ActionKind, ActionResult, BoxedPayload, CancellationToken, Payload,
};

/// Value produced by a successful invocation, erased until delivery.
pub(crate) type Output = Box<dyn Any + Send>;

/// Everything a single invocation can end with.
pub(crate) type Outcome = ActionResult<Option<Output>>;

pub(crate) type ErrorSink = Box<dyn Fn(ActionError) + Send + Sync>;

/// Type-erased operation bound to an action id.
pub(crate) trait ActionRecord: Send + Sync + fmt::Debug {
    fn id(&self) -> ActionId;

    fn kind(&self) -> ActionKind;

    /// Name of the input type the function expects.
    fn input_type(&self) -> &'static str;

    /// Whether `input` has the type the function expects.
    fn accepts(&self, input: &dyn Payload) -> bool;

    /// Runs the function. Called on a pool thread, possibly repeatedly.
    fn invoke(&self, input: BoxedPayload, token: &CancellationToken) -> Outcome;

    /// Hands the final outcome to the callbacks. Called on the owner thread.
    fn deliver(&self, outcome: Outcome);
}

fn downcast_input<I: Payload>(id: ActionId, input: BoxedPayload) -> ActionResult<I> {
    input.downcast::<I>().map(|input| *input).map_err(|input| {
        ActionError::Failed(anyhow::anyhow!(
            "{id} expects {}, got {}",
            std::any::type_name::<I>(),
            input.payload_type()
        ))
    })
}

fn report_unhandled(id: ActionId, kind: ActionKind, error: ActionError) {
    tracing::warn!(action = %id, kind = %kind, error = %error, "Action failed with no error sink");
}

// --- Get ---

pub(crate) struct GetRecord<I, T, F, R> {
    id: ActionId,
    function: F,
    on_result: R,
    on_error: Option<ErrorSink>,
    _types: PhantomData<fn(I) -> T>,
}

impl<I, T, F, R> GetRecord<I, T, F, R>
where
    F: Fn(I, &CancellationToken) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    R: Fn(ActionResult<Option<T>>) + Send + Sync + 'static,
{
    pub(crate) fn new(id: ActionId, function: F, on_result: R, on_error: Option<ErrorSink>) -> Self {
        Self {
            id,
            function,
            on_result,
            on_error,
            _types: PhantomData,
        }
    }
}

impl<I, T, F, R> fmt::Debug for GetRecord<I, T, F, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetRecord")
            .field("id", &self.id)
            .field("input", &std::any::type_name::<I>())
            .field("output", &std::any::type_name::<T>())
            .field("has_error_sink", &self.on_error.is_some())
            .finish()
    }
}

impl<I, T, F, R> ActionRecord for GetRecord<I, T, F, R>
where
    I: Payload,
    T: Send + 'static,
    F: Fn(I, &CancellationToken) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    R: Fn(ActionResult<Option<T>>) + Send + Sync + 'static,
{
    fn id(&self) -> ActionId {
        self.id
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Get
    }

    fn input_type(&self) -> &'static str {
        std::any::type_name::<I>()
    }

    fn accepts(&self, input: &dyn Payload) -> bool {
        input.is::<I>()
    }

    fn invoke(&self, input: BoxedPayload, token: &CancellationToken) -> Outcome {
        let input = downcast_input::<I>(self.id, input)?;
        match (self.function)(input, token) {
            Ok(value) => Ok(value.map(|value| Box::new(value) as Output)),
            Err(error) => Err(ActionError::from_failure(error)),
        }
    }

    fn deliver(&self, outcome: Outcome) {
        let result = outcome.and_then(|value| match value {
            None => Ok(None),
            Some(value) => value.downcast::<T>().map(|value| Some(*value)).map_err(|_| {
                ActionError::Failed(anyhow::anyhow!(
                    "{} produced a value that is not {}",
                    self.id,
                    std::any::type_name::<T>()
                ))
            }),
        });

        match (result, &self.on_error) {
            (Err(error), Some(on_error)) => on_error(error),
            (result, _) => (self.on_result)(result),
        }
    }
}

// --- Set ---

pub(crate) struct SetRecord<T, F> {
    id: ActionId,
    function: F,
    on_error: Option<ErrorSink>,
    _types: PhantomData<fn(T)>,
}

impl<T, F> SetRecord<T, F>
where
    F: Fn(T, &CancellationToken) -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub(crate) fn new(id: ActionId, function: F, on_error: Option<ErrorSink>) -> Self {
        Self {
            id,
            function,
            on_error,
            _types: PhantomData,
        }
    }
}

impl<T, F> fmt::Debug for SetRecord<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetRecord")
            .field("id", &self.id)
            .field("input", &std::any::type_name::<T>())
            .field("has_error_sink", &self.on_error.is_some())
            .finish()
    }
}

impl<T, F> ActionRecord for SetRecord<T, F>
where
    T: Payload,
    F: Fn(T, &CancellationToken) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn id(&self) -> ActionId {
        self.id
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Set
    }

    fn input_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn accepts(&self, input: &dyn Payload) -> bool {
        input.is::<T>()
    }

    fn invoke(&self, input: BoxedPayload, token: &CancellationToken) -> Outcome {
        let input = downcast_input::<T>(self.id, input)?;
        (self.function)(input, token)
            .map(|()| None)
            .map_err(ActionError::from_failure)
    }

    fn deliver(&self, outcome: Outcome) {
        if let Err(error) = outcome {
            match &self.on_error {
                Some(on_error) => on_error(error),
                None => report_unhandled(self.id, ActionKind::Set, error),
            }
        }
    }
}

// --- Void ---

pub(crate) struct VoidRecord<F> {
    id: ActionId,
    function: F,
    on_error: Option<ErrorSink>,
}

impl<F> VoidRecord<F>
where
    F: Fn(&CancellationToken) -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub(crate) fn new(id: ActionId, function: F, on_error: Option<ErrorSink>) -> Self {
        Self { id, function, on_error }
    }
}

impl<F> fmt::Debug for VoidRecord<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoidRecord")
            .field("id", &self.id)
            .field("has_error_sink", &self.on_error.is_some())
            .finish()
    }
}

impl<F> ActionRecord for VoidRecord<F>
where
    F: Fn(&CancellationToken) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn id(&self) -> ActionId {
        self.id
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Void
    }

    fn input_type(&self) -> &'static str {
        std::any::type_name::<()>()
    }

    fn accepts(&self, input: &dyn Payload) -> bool {
        input.is::<()>()
    }

    fn invoke(&self, _input: BoxedPayload, token: &CancellationToken) -> Outcome {
        (self.function)(token)
            .map(|()| None)
            .map_err(ActionError::from_failure)
    }

    fn deliver(&self, outcome: Outcome) {
        if let Err(error) = outcome {
            match &self.on_error {
                Some(on_error) => on_error(error),
                None => report_unhandled(self.id, ActionKind::Void, error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use courier_api::Cancelled;

    use super::*;

    fn len_record(
        results: Arc<Mutex<Vec<ActionResult<Option<usize>>>>>,
    ) -> impl ActionRecord {
        GetRecord::new(
            ActionId(0),
            |s: String, _: &CancellationToken| Ok(Some(s.len())),
            move |result| results.lock().unwrap().push(result),
            None,
        )
    }

    #[test]
    fn get_record_delivers_typed_value() {
        let results = Arc::new(Mutex::new(Vec::new()));
        let record = len_record(results.clone());

        assert!(record.accepts(&String::from("x")));
        assert!(!record.accepts(&5u32));

        let outcome = record.invoke(Box::new(String::from("abcd")), &CancellationToken::never());
        record.deliver(outcome);

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &Some(4));
    }

    #[test]
    fn get_record_without_sink_routes_errors_to_result() {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        let record = GetRecord::new(
            ActionId(1),
            |_: (), _: &CancellationToken| -> anyhow::Result<Option<u8>> { anyhow::bail!("offline") },
            move |result| sink.lock().unwrap().push(result),
            None,
        );

        record.deliver(record.invoke(Box::new(()), &CancellationToken::never()));

        let results = results.lock().unwrap();
        assert_eq!(results[0].as_ref().unwrap_err().to_string(), "offline");
    }

    #[test]
    fn get_record_with_sink_splits_outcomes() {
        let values = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (v, e) = (values.clone(), errors.clone());
        let record = GetRecord::new(
            ActionId(2),
            |n: i32, _: &CancellationToken| {
                if n < 0 {
                    anyhow::bail!("negative")
                }
                Ok(Some(n * 2))
            },
            move |result: ActionResult<Option<i32>>| v.lock().unwrap().push(result.ok().flatten()),
            Some(Box::new(move |error: ActionError| e.lock().unwrap().push(error.to_string()))),
        );

        record.deliver(record.invoke(Box::new(21i32), &CancellationToken::never()));
        record.deliver(record.invoke(Box::new(-1i32), &CancellationToken::never()));

        assert_eq!(*values.lock().unwrap(), vec![Some(42)]);
        assert_eq!(*errors.lock().unwrap(), vec!["negative".to_string()]);
    }

    #[test]
    fn cancellation_is_classified() {
        let record = SetRecord::new(
            ActionId(3),
            |_: u8, token: &CancellationToken| {
                token.check()?;
                Ok(())
            },
            None,
        );
        let interrupted = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let token = CancellationToken::new(Arc::new(Default::default()), 0, interrupted);

        let outcome = record.invoke(Box::new(1u8), &token);
        assert!(matches!(outcome, Err(ActionError::Cancelled(Cancelled::Interrupted))));
    }

    #[test]
    fn void_record_reports_errors_to_sink() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let record = VoidRecord::new(
            ActionId(4),
            |_: &CancellationToken| anyhow::bail!("disk full"),
            Some(Box::new(move |error: ActionError| sink.lock().unwrap().push(error.to_string()))),
        );

        assert_eq!(record.kind(), ActionKind::Void);
        assert!(record.accepts(&()));
        record.deliver(record.invoke(Box::new(()), &CancellationToken::never()));
        assert_eq!(*errors.lock().unwrap(), vec!["disk full".to_string()]);
    }
}
