use std::{cell::RefCell, ffi::OsStr};

#[derive(Clone, Copy)]
struct Env {
    max_steps: Option<u64>,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

/// Read configuration from the environment. Call once at start-up.
pub fn init() {
    let value = Env {
        max_steps: var_parse("DISM_MAX_STEPS"),
    };
    set_env(value);
}

/// Default execution budget, from `DISM_MAX_STEPS`.
pub fn max_steps() -> Option<u64> {
    with_env(|env| env.max_steps)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_parse(name: &str) -> Option<u64> {
    let value = std::env::var(OsStr::new(name)).ok()?;
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            log::warn!("ignoring {name}={value:?}: expected a whole number");
            None
        }
    }
}
