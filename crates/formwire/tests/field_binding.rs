//! Field binding against the in-memory presentation layer.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use formwire::testing::{Checkbox, MemoryDom, NumberInput, TextInput};
use formwire::validation::{MinLength, Range, Required, validator_fn};
use formwire::{
    Adapter, BindTarget, BindingError, ChangeEvent, EngineConfig, Field, FieldState, FieldStatus,
    Outcome, ValidatorSpec, validators,
};
use serde_json::json;

fn counter<T: 'static>(field: &Field<T>) -> (Rc<Cell<usize>>, formwire::Subscription)
where
    T: Clone + PartialEq,
{
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    let sub = field.on_value_change(move |_| c.set(c.get() + 1));
    (count, sub)
}

#[test]
fn min_length_reports_current_length() {
    let input = TextInput::new("");
    let field = Field::new(
        Rc::clone(&input),
        String::new(),
        validators![MinLength::new(8)],
    )
    .unwrap();

    assert!(!field.valid());
    assert_eq!(
        field.errors().unwrap().to_json(),
        json!([{ "minLength": { "mustBe": 8, "currentLength": 0 } }])
    );

    input.simulate_input("abcdefgh");
    assert!(field.valid());
    assert!(field.errors().is_none());
}

#[test]
fn equal_assignment_is_silent() {
    let input = TextInput::new("");
    let runs = Rc::new(Cell::new(0));
    let r = Rc::clone(&runs);
    let field = Field::new(
        Rc::clone(&input),
        "v".to_string(),
        vec![ValidatorSpec::new(validator_fn(
            "counted",
            move |_: &FieldState<'_, String>| {
                r.set(r.get() + 1);
                Outcome::Success
            },
        ))],
    )
    .unwrap();
    let (count, _sub) = counter(&field);
    let writes = input.write_count();
    let evaluated = runs.get();

    field.set_value(field.value());
    field.set_value("v".to_string());
    input.simulate_input("v");

    assert_eq!(count.get(), 0);
    assert_eq!(input.write_count(), writes);
    assert_eq!(runs.get(), evaluated);

    input.simulate_input("w");
    assert_eq!(runs.get(), evaluated + 1);
}

#[test]
fn construction_is_silent_and_reset_idempotent() {
    let input = TextInput::new("stale");
    let field = Field::new(Rc::clone(&input), "fresh".to_string(), Vec::new()).unwrap();
    let (count, _sub) = counter(&field);
    assert_eq!(input.text(), "fresh");
    assert_eq!(count.get(), 0);

    field.reset();
    assert_eq!(count.get(), 0);

    input.simulate_input("edited");
    assert_eq!(field.status(), FieldStatus::Dirty);
    field.reset();
    field.reset();
    assert_eq!(count.get(), 2);
    assert_eq!(input.text(), "fresh");
    assert_eq!(field.status(), FieldStatus::Clean);
}

#[test]
fn echoing_adapter_does_not_loop() {
    let input = TextInput::new("");
    input.set_echo_writes(true);
    let field = Field::new(Rc::clone(&input), String::new(), Vec::new()).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let _sub = field.on_value_change(move |e: &ChangeEvent<String>| {
        sink.borrow_mut().push(e.value.clone());
    });

    field.set_value("typed".to_string());

    assert_eq!(*log.borrow(), vec!["typed".to_string()]);
    assert_eq!(input.write_count(), 2);
    // The echo carries the value the field already holds.
    assert!(!field.is_touched());
}

#[test]
fn binding_errors() {
    let dom = MemoryDom::new();
    dom.insert_text("a", &["name"], "");
    dom.insert_text("b", &["name"], "");
    dom.insert_checkbox("agree", &[], false);

    let not_found = Field::new(
        BindTarget::<String>::query(&dom, "#missing"),
        String::new(),
        Vec::new(),
    )
    .unwrap_err();
    assert_eq!(
        not_found,
        BindingError::NotFound {
            selector: "#missing".to_string()
        }
    );

    let ambiguous = Field::new(
        BindTarget::<String>::query(&dom, ".name"),
        String::new(),
        Vec::new(),
    )
    .unwrap_err();
    assert_eq!(
        ambiguous,
        BindingError::Ambiguous {
            selector: ".name".to_string(),
            matches: 2
        }
    );

    let mismatch = Field::new(
        BindTarget::<String>::query(&dom, "#agree"),
        String::new(),
        Vec::new(),
    )
    .unwrap_err();
    assert!(matches!(mismatch, BindingError::TypeMismatch { .. }));

    let detached = TextInput::new("");
    detached.detach();
    let err = Field::new(Rc::clone(&detached), "x".to_string(), Vec::new()).unwrap_err();
    assert_eq!(err, BindingError::Detached);
    assert_eq!(detached.write_count(), 0);
}

#[test]
fn query_ignores_detached_elements() {
    let dom = MemoryDom::new();
    let stale = dom.insert_text("user", &["name"], "");
    stale.detach();

    let err = Field::new(
        BindTarget::<String>::query(&dom, "#user"),
        "x".to_string(),
        Vec::new(),
    )
    .unwrap_err();
    assert_eq!(err, BindingError::Detached);
    assert_eq!(stale.write_count(), 0);

    let live = dom.insert_text("nick", &["name"], "");
    let field = Field::new(
        BindTarget::<String>::query(&dom, ".name"),
        "bob".to_string(),
        Vec::new(),
    )
    .unwrap();
    assert_eq!(live.text(), "bob");
    assert!(field.is_bound());
    assert_eq!(stale.write_count(), 0);
}

#[test]
fn checkbox_and_number_inputs_coerce() {
    let agree = Checkbox::new(false);
    let accepted = Field::new(Rc::clone(&agree), true, validators![Required::new()]).unwrap();
    assert!(agree.is_checked());
    assert!(accepted.valid());
    agree.simulate_input(false);
    assert!(!accepted.valid());
    assert!(accepted.errors().unwrap().contains("required"));

    let age_input = NumberInput::new("");
    let age = Field::new(
        Rc::clone(&age_input),
        Some(30_i64),
        vec![ValidatorSpec::new(validator_fn(
            "range",
            |s: &FieldState<'_, Option<i64>>| match *s.value {
                Some(n) if !(18..=120).contains(&n) => Outcome::failure(json!({ "actual": n })),
                None => Outcome::flag(),
                _ => Outcome::Success,
            },
        ))],
    )
    .unwrap();
    assert_eq!(age_input.native(), "30");

    age_input.simulate_input("12");
    assert_eq!(age.value(), Some(12));
    assert_eq!(age.errors().unwrap().get("range"), Some(&json!({ "actual": 12 })));

    age_input.simulate_input("not a number");
    assert_eq!(age.value(), None);
    assert!(!age.valid());
}

#[test]
fn range_validator_on_plain_numbers() {
    struct Slider {
        value: Cell<i32>,
    }

    impl Adapter<i32> for Slider {
        fn read_value(&self) -> i32 {
            self.value.get()
        }

        fn write_value(&self, value: &i32) {
            self.value.set(*value);
        }

        fn subscribe(&self, _on_external_change: Rc<dyn Fn(i32)>) -> formwire::Subscription {
            formwire::Subscription::noop()
        }
    }

    let slider = Rc::new(Slider { value: Cell::new(0) });
    let volume = Field::new(Rc::clone(&slider), 5, validators![Range::new(0, 10)]).unwrap();
    assert!(volume.valid());

    volume.set_value(11);
    assert_eq!(slider.read_value(), 11);
    assert_eq!(
        volume.errors().unwrap().get("range"),
        Some(&json!({ "min": 0, "max": 10, "actual": 11 }))
    );
}

#[test]
fn listener_can_drive_another_field() {
    let source_input = TextInput::new("");
    let mirror_input = TextInput::new("");
    let source = Field::new(Rc::clone(&source_input), String::new(), Vec::new()).unwrap();
    let mirror = Field::new(Rc::clone(&mirror_input), String::new(), Vec::new()).unwrap();

    let target = mirror.clone();
    let _sub = source.on_value_change(move |e| target.set_value(e.value.to_uppercase()));

    source_input.simulate_input("hello");
    assert_eq!(mirror.value(), "HELLO");
    assert_eq!(mirror_input.text(), "HELLO");
    assert!(!mirror.is_touched());
}

#[test]
fn panicking_validator_is_contained() {
    let input = TextInput::new("");
    let field = Field::with_config(
        Rc::clone(&input),
        "ok".to_string(),
        vec![
            ValidatorSpec::new(validator_fn("explodes", |s: &FieldState<'_, String>| {
                if s.value == "boom" {
                    panic!("cannot validate boom");
                }
                Outcome::Success
            })),
            ValidatorSpec::new(Required::new()),
        ],
        &EngineConfig::default(),
    )
    .unwrap();

    input.simulate_input("boom");
    assert_eq!(field.value(), "boom");
    assert_eq!(
        field.errors().unwrap().to_json(),
        json!([{ "explodes": { "executionError": "cannot validate boom" } }])
    );
}

#[test]
fn uncontained_panic_still_records_failure() {
    let input = TextInput::new("");
    let field = Field::with_config(
        Rc::clone(&input),
        "ok".to_string(),
        vec![ValidatorSpec::new(validator_fn(
            "explodes",
            |s: &FieldState<'_, String>| {
                if s.value == "boom" {
                    panic!("cannot validate boom");
                }
                Outcome::Success
            },
        ))],
        &EngineConfig::default().with_catch_validator_panics(false),
    )
    .unwrap();
    let (count, _sub) = counter(&field);
    assert!(field.valid());

    let unwound = panic::catch_unwind(AssertUnwindSafe(|| field.set_value("boom".to_string())));
    assert!(unwound.is_err());

    assert_eq!(field.value(), "boom");
    assert_eq!(input.text(), "boom");
    assert!(!field.valid());
    assert_eq!(
        field.errors().unwrap().to_json(),
        json!([{ "explodes": { "executionError": "cannot validate boom" } }])
    );
    assert_eq!(count.get(), 0);

    field.set_value("fine".to_string());
    assert!(field.valid());
    assert_eq!(count.get(), 1);
}

#[test]
fn factory_runs_once_per_field() {
    let built = Rc::new(Cell::new(0));
    let b = Rc::clone(&built);
    let input = TextInput::new("");
    let field = Field::new(
        Rc::clone(&input),
        String::new(),
        vec![ValidatorSpec::factory(move || {
            b.set(b.get() + 1);
            MinLength::new(2)
        })],
    )
    .unwrap();

    for text in ["a", "ab", "abc"] {
        input.simulate_input(text);
    }
    assert!(field.valid());
    assert_eq!(built.get(), 1);
}
