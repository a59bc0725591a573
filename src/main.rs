use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use ripple::diagnostics::Diagnostic;
use ripple::{ContextRef, Engine, Namespace, Value};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return;
    }

    let engine = Engine::new();
    let namespace = Arc::new(Namespace::new());
    let ctx = ContextRef::from_arc(namespace.clone());

    // One-shot evaluation: ripple -e "3+4*2"
    if let Some(at) = args.iter().position(|arg| arg == "-e") {
        match args.get(at + 1) {
            Some(text) => run_line(&engine, &namespace, &ctx, text),
            None => eprintln!("-e needs a formula"),
        }
        return;
    }

    println!("ripple {} (`:help` for commands)", env!("CARGO_PKG_VERSION"));
    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            ":quit" | ":q" => break,
            ":help" => print_help(),
            ":vars" => {
                for (name, value) in engine.variables() {
                    println!("{} = {}", name, value);
                }
            }
            ":snapshot" => match engine.snapshot(SETTLE_TIMEOUT) {
                Ok(json) => println!("{}", json),
                Err(error) => eprintln!("{}", Diagnostic::from_graph_error(&error).render(None)),
            },
            _ => run_line(&engine, &namespace, &ctx, line),
        }
    }
}

/// `name = formula` defines or rewires a variable; anything else
/// evaluates once. A bare `=` is also the equality operator, so only a
/// plain identifier on the left side counts as a definition.
fn run_line(engine: &Engine, namespace: &Namespace, ctx: &ContextRef, line: &str) {
    if let Some((name, formula)) = split_definition(line) {
        let var = engine.variable(name);
        namespace.insert_variable(name, var);
        match engine.set_contents(var, formula, Some(ctx)) {
            Ok(()) => println!("{} = {}", name, engine.value(var)),
            Err(error) => {
                eprintln!("{}", Diagnostic::from_graph_error(&error).render(Some(formula)));
            }
        }
        return;
    }
    match engine.evaluate(line, Some(ctx)) {
        Ok(value) => report(value),
        Err(error) => {
            eprintln!("{}", Diagnostic::from_graph_error(&error).render(Some(line)));
        }
    }
}

/// Treat `ident = rest` as a definition only when the left side is a
/// plain name and something follows the `=`.
fn split_definition(line: &str) -> Option<(&str, &str)> {
    let (head, rest) = line.split_once('=')?;
    let name = head.trim();
    let formula = rest.trim();
    if formula.is_empty() || formula.starts_with('=') {
        return None;
    }
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    plain.then_some((name, formula))
}

fn report(value: Value) {
    if let Value::Error(error) = &value {
        eprintln!("{}", Diagnostic::error(error.to_string()).render(None));
    } else {
        println!("{}", value);
    }
}

fn print_help() {
    println!("usage: ripple [-e FORMULA]");
    println!();
    println!("  name = formula   define or rewire a variable");
    println!("  formula          evaluate once");
    println!("  :vars            list variables and current values");
    println!("  :snapshot        settle and print all values as JSON");
    println!("  :quit            exit");
}
