//! Long-form `--help` text, kept out of `cli.rs` so the argument schema
//! stays readable.

pub const ROOT_LONG_ABOUT: &str = "\
dirsweep watches a directory subtree across repeated invocations, keeps a \
durable index of every path it has seen, and enforces age and aggregate \
size retention limits. Each policy violation is handed to a user-supplied \
hook (a shell command template or, when embedded as a library, a Rust \
closure) that decides whether to remove the entry and whether to commit \
the bookkeeping update.";

pub const SCAN_LONG_ABOUT: &str = "\
Runs the full pipeline: lock the state database, load it, walk the \
directory, reconcile the walk against the saved index, evaluate the age \
and size policies, dispatch hooks for every addition, change, removal and \
policy violation, then save and unlock. This is the only subcommand that \
can delete anything, and only through a hook.";

pub const STATUS_LONG_ABOUT: &str = "\
Runs lock, load, walk and reconcile, then saves only if the index changed \
shape (additions, removals, or a legacy-format upgrade). No policy is \
evaluated and no hook fires; use this to see what a scan would classify \
without touching a single file.";
