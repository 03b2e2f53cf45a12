//! Terminal rendering of merge plans and resolution failures.

use console::style;
use ebuild_resolver::{MergePlan, Operation, ResolveFailure};

/// Print the plan's operations in merge order
pub fn print_plan(plan: &MergePlan, include_livefs: bool) {
    let ops: Vec<Operation> = plan.iter_ops(include_livefs).collect();
    if ops.is_empty() {
        println!("{} Nothing to merge", style("Info:").cyan());
        return;
    }

    println!(
        "{}",
        style("These are the packages that would be merged, in order:").white().bold()
    );
    println!();
    for op in &ops {
        match op {
            Operation::Install(pkg) if pkg.repo().livefs() => {
                println!("[{}] {}", style("nomerge").dim(), style(pkg).dim());
            }
            Operation::Install(pkg) => {
                println!("[{}] {}", style("N").green().bold(), pkg);
            }
            Operation::Replace { old, new } => {
                println!(
                    "[{}] {} {}",
                    style("U").cyan().bold(),
                    new,
                    style(format!("[{}]", old.version())).dim()
                );
            }
            Operation::Remove(pkg) => {
                println!("[{}] {}", style("D").red().bold(), pkg);
            }
        }
    }

    println!();
    println!("Total: {}", summary(&ops));
}

fn summary(ops: &[Operation]) -> String {
    let count = |kind: &str| ops.iter().filter(|op| op.kind() == kind).count();
    format!(
        "{} package(s) ({} new, {} upgraded or replaced, {} removed)",
        ops.len(),
        count("install"),
        count("replace"),
        count("remove")
    )
}

/// Print a failure trace to stderr
pub fn print_failure(failure: &ResolveFailure) {
    eprintln!(
        "{} unable to resolve {}",
        style("Error:").red().bold(),
        style(&failure.atom).cyan()
    );
    for line in failure.trace.to_string().lines() {
        eprintln!("  {}", line);
    }
}
