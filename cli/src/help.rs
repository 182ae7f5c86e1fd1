pub const SUMMARY_LONG_HELP: &str = r#"Summarize McAfee quarantine files into a single report

<ROOT_DIR> is searched recursively for files with the `.bup` extension (in any
case). Each file is expected to be inside a directory named after the host it was
collected from, like this:

  evidence/
    WKS-01/
      4c2b1e0a1d3b6f1a.bup
    WKS-02/
      0e1f6d4a2c3b5e7f.bup

Every file produces exactly one row in the report, files that can't be decoded
are reported as corrupt."#;

pub const CONFIG_FILE: &str = r#"Config file

Specifies a config file with default values for some of the options. If config
file is not specified, ${HOME}/.bup-summary.toml is used. If it does not exist
the default options are applied. Options passed in the command line take
precedence over the config file.

Example:

[summary]
threads = 4
keep_unicode = false
legacy_values = false
skip_larger = 104857600"#;

pub const KEEP_UNICODE_LONG_HELP: &str = r#"Keep non-ASCII characters in original names

By default, non-ASCII characters are removed from the original name of the
quarantined file, and the text " (Unicode char(s) ignored)" is appended to it.
With this option names are reported as they are, as long as they are valid
UTF-8."#;

pub const LEGACY_VALUES_LONG_HELP: &str = r#"Truncate values at the second equal sign

In the `Details` stream each line has the form `key=value`. By default, values
that contain equal signs are kept whole. With this option values are truncated at
the second equal sign (`a=b=c` produces `b`), which is what older reports
contain."#;

pub const MAX_DEPTH_LONG_HELP: &str = r#"Walk directories up to a given depth

By default subdirectories of <ROOT_DIR> are walked without depth limits.

--max-depth=0   process only the files in <ROOT_DIR> (no subdirectories)
--max-depth=2   process up to 2 levels deep"#;

pub const OUTPUT_FORMAT_LONG_HELP: &str = r#"Output format for the report

The format can be:

csv     comma-separated values, with a header row
ndjson  newline-delimited JSON (i.e: one JSON object per line), which includes
        every section and key in the `Details` stream"#;

pub const THREADS_LONG_HELP: &str = r#"Use the specified number of threads

The default value is automatically determined based on the number of CPU cores."#;
