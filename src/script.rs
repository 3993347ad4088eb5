//! Wraps user Python with fixed boilerplate for the chart flavor (spec
//! §4.4), mirroring the shape of the original sandbox's script template:
//! force a non-interactive backend, run user code inside a try/except
//! that turns any exception into exit code 1, then save the first active
//! figure as PNG.

/// Build the full Python source to execute for a chart request.
///
/// `output_filename` is written bare into the generated source and is
/// never path-joined here: the runner supplies the containing directory
/// via `working_dir`, so the script always saves into its own current
/// directory.
pub fn build_chart_script(user_code: &str, output_filename: &str) -> String {
    let indented_user_code: String = user_code
        .trim()
        .lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"import matplotlib
matplotlib.use('Agg')
import matplotlib.pyplot as plt
import pandas as pd
import numpy as np
import sys

print("--- Starting User Code Execution ---", flush=True)
try:
{indented_user_code}
except Exception as e:
    print(f"Error during user code execution: {{e}}", file=sys.stderr, flush=True)
    sys.exit(1)

print("--- User Code Finished ---", flush=True)

try:
    output_path = '{output_filename}'
    if plt.get_fignums():
        print(f"Saving plot to {{output_path}}...", flush=True)
        plt.savefig(output_path, format='png', bbox_inches='tight')
        print("Plot saved successfully.", flush=True)
    else:
        print("No matplotlib plot detected to save.", file=sys.stderr, flush=True)
        sys.exit(2)
except SystemExit:
    raise
except Exception as e:
    print(f"Error saving plot: {{e}}", file=sys.stderr, flush=True)
    sys.exit(3)
finally:
    plt.close('all')

print("--- Script Finished Successfully ---", flush=True)
sys.exit(0)
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_user_code_with_backend_and_markers() {
        let source = build_chart_script("plt.plot([1,2,3])", "out.png");
        assert!(source.contains("matplotlib.use('Agg')"));
        assert!(source.contains("--- Starting User Code Execution ---"));
        assert!(source.contains("    plt.plot([1,2,3])"));
        assert!(source.contains("output_path = 'out.png'"));
    }

    #[test]
    fn exits_nonzero_paths_are_present() {
        let source = build_chart_script("x = 1", "out.png");
        assert!(source.contains("sys.exit(1)"));
        assert!(source.contains("sys.exit(2)"));
        assert!(source.contains("sys.exit(3)"));
        assert!(source.contains("sys.exit(0)"));
    }

    #[test]
    fn indents_every_user_line() {
        let source = build_chart_script("a = 1\nb = 2", "out.png");
        assert!(source.contains("    a = 1\n    b = 2"));
    }

    #[test]
    fn always_closes_figures_in_finally() {
        let source = build_chart_script("pass", "out.png");
        assert!(source.contains("finally:\n    plt.close('all')"));
    }
}
