use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use crossbeam::channel::{Receiver, RecvTimeoutError, SendError, Sender};
use crossterm::tty::IsTty;
use globwalk::FileType;
use superconsole::{Component, Lines, SuperConsole};

/// Walks the files in a directory, running a given function for each file
/// whose path matches the filters.
///
/// ```text
/// let mut walker = Walker::path(Path::new("."));
///
/// walker.filter("**/*.bup").case_insensitive(true);
///
/// walker.walk(
///     // This function is called for each file.
///     |file_path| {
///         // ... do something with the file
///         Ok(())
///     },
///     // This function is called with any error found during the walk.
///     |err| {
///         Ok(())
///     }
/// ).unwrap();
/// ```
pub(crate) struct Walker<'a> {
    /// Path to the directory that will be walked.
    path: &'a Path,
    /// Glob patterns, files that don't match at least one of them are
    /// ignored.
    filters: Vec<String>,
    /// If true, filters are matched ignoring case.
    case_insensitive: bool,
    /// Maximum recursion depth. `None` means no limit.
    max_depth: Option<usize>,
}

impl<'a> Walker<'a> {
    /// Creates a [`Walker`] that walks a directory.
    pub fn path(path: &'a Path) -> Self {
        Self {
            path,
            filters: Vec::new(),
            case_insensitive: false,
            max_depth: None,
        }
    }

    /// Adds a glob pattern that controls which files will be processed.
    ///
    /// When one or more filters are added, only those files with a path
    /// that matches at least one of the filters will be processed. By
    /// default, all files are processed.
    pub fn filter(&mut self, filter: &str) -> &mut Self {
        self.filters.push(filter.to_string());
        self
    }

    /// Matches filters ignoring case, so that `**/*.bup` also matches
    /// `FOO.BUP`.
    pub fn case_insensitive(&mut self, yes: bool) -> &mut Self {
        self.case_insensitive = yes;
        self
    }

    /// Sets a maximum depth while traversing the directory tree.
    ///
    /// When the maximum depth is 0 only the files that reside in the given
    /// directory are processed. By default, subdirectories are traversed
    /// without depth limits.
    pub fn max_depth(&mut self, n: usize) -> &mut Self {
        self.max_depth = Some(n);
        self
    }

    /// Walks the directory, calling `f` for every file.
    ///
    /// The `e` function is called with any error that occurs during the
    /// walk, including errors returned by `f` itself. `e` must return
    /// `Ok(())` for continuing the walk or `Err` for aborting.
    pub fn walk<F, E>(self, mut f: F, mut e: E) -> anyhow::Result<()>
    where
        F: FnMut(&Path) -> anyhow::Result<()>,
        E: FnMut(anyhow::Error) -> anyhow::Result<()>,
    {
        // globwalk panics with paths that start with ./ (.\ in Windows),
        // except for "." itself.
        let path = if self.path.as_os_str().len() > 2 {
            self.path
                .strip_prefix(if cfg!(target_os = "windows") {
                    r#".\"#
                } else {
                    "./"
                })
                .unwrap_or(self.path)
        } else {
            self.path
        };

        let patterns: Vec<&str> = if self.filters.is_empty() {
            vec!["**"]
        } else {
            self.filters.iter().map(|f| f.as_str()).collect()
        };

        let mut builder =
            globwalk::GlobWalkerBuilder::from_patterns(path, &patterns)
                .file_type(FileType::FILE)
                .case_insensitive(self.case_insensitive);

        if let Some(max_depth) = self.max_depth {
            builder = builder.max_depth(max_depth + 1);
        }

        for entry in builder.build()? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    e(err.into())?;
                    continue;
                }
            };

            if let Err(err) = f(entry.path()) {
                e(err)?
            }
        }

        Ok(())
    }
}

/// Walks a directory calling a given function for each file, like
/// [`Walker`], but using multiple threads for processing multiple files
/// simultaneously.
///
/// One thread walks the directory and puts the file paths in a bounded
/// channel, from which a pool of worker threads takes them. The function
/// that processes each file receives a shared state of some type `S` that
/// implements the [`Component`] trait, and an output channel of type
/// &[`Sender<Message>`] for writing messages to the console. Worker
/// functions must not write to `stdout` or `stderr` directly.
///
/// The state is rendered as a status footer when stdout is a terminal, and
/// returned once every file has been processed.
///
/// When an error occurs, either while walking the directory or in the
/// user-provided function, it is passed to an error handling function that
/// decides whether the walk continues (`Ok`) or is aborted (`Err`).
///
/// ```text
/// let state = ParWalker::path(Path::new(".")).walk(
///     // The initial state.
///     state,
///     // Called for each file.
///     |state, output, file_path| {
///         output.send(Message::Info(format!("{}", file_path.display())))?;
///         Ok(())
///     },
///     // Called with every error that occurs during the walk.
///     |err, output| {
///         let _ = output.send(Message::Error(err.to_string()));
///         Ok(())
///     }
/// )?;
/// ```
pub(crate) struct ParWalker<'a> {
    num_threads: Option<u8>,
    walker: Walker<'a>,
}

impl<'a> ParWalker<'a> {
    /// Creates a [`ParWalker`] that walks a directory.
    pub fn path(path: &'a Path) -> Self {
        Self { walker: Walker::path(path), num_threads: None }
    }

    /// Sets the number of worker threads.
    ///
    /// By default, the number of threads is determined by the number of
    /// CPUs in the current host.
    pub fn num_threads(&mut self, n: u8) -> &mut Self {
        self.num_threads = Some(n);
        self
    }

    /// See [`Walker::max_depth`].
    pub fn max_depth(&mut self, n: usize) -> &mut Self {
        self.walker.max_depth(n);
        self
    }

    /// See [`Walker::filter`].
    pub fn filter(&mut self, filter: &str) -> &mut Self {
        self.walker.filter(filter);
        self
    }

    /// See [`Walker::case_insensitive`].
    pub fn case_insensitive(&mut self, yes: bool) -> &mut Self {
        self.walker.case_insensitive(yes);
        self
    }

    /// Runs `action` on every file.
    ///
    /// See [`ParWalker`] for details.
    pub fn walk<S, A, E>(
        self,
        state: S,
        action: A,
        error: E,
    ) -> anyhow::Result<S>
    where
        S: Component + Send + Sync,
        A: Fn(&S, &Sender<Message>, PathBuf) -> anyhow::Result<()>
            + Send
            + Sync
            + Copy,
        E: Fn(anyhow::Error, &Sender<Message>) -> anyhow::Result<()>
            + Send
            + Sync
            + Copy,
    {
        let num_threads = if let Some(num_threads) = self.num_threads {
            num_threads as usize
        } else {
            thread::available_parallelism().map(usize::from).unwrap_or(32)
        };

        let state = Arc::new(state);

        crossbeam::scope(|s| {
            // Paths of the files that need to be processed by `action`.
            let (paths_send, paths_recv) =
                crossbeam::channel::bounded::<PathBuf>(128);

            // Lines that the workers want to show in the console.
            let (msg_send, msg_recv) =
                crossbeam::channel::unbounded::<Message>();

            for _ in 0..num_threads {
                let paths_recv = paths_recv.clone();
                let msg_send = msg_send.clone();
                let state = state.clone();
                s.spawn(move |_| {
                    for path in paths_recv {
                        if let Err(err) = action(&state, &msg_send, path) {
                            if error(err, &msg_send).is_err() {
                                let _ = msg_send.send(Message::Abort);
                                break;
                            }
                        }
                    }
                });
            }

            // Workers own the receiving side from now on. When all of them
            // exit, the walker thread can't send more paths and stops.
            drop(paths_recv);

            let walker = self.walker;
            let walker_msg_send = msg_send.clone();

            s.spawn(move |_| {
                let msg_send = walker_msg_send;
                let res = walker.walk(
                    |file_path| Ok(paths_send.send(file_path.to_path_buf())?),
                    |err| {
                        // The workers are gone, stop walking.
                        if err.is::<SendError<PathBuf>>() {
                            return Err(err);
                        }
                        if let Err(err) = error(err, &msg_send) {
                            let _ = msg_send.send(Message::Abort);
                            return Err(err);
                        }
                        Ok(())
                    },
                );
                if let Err(err) = res {
                    if !err.is::<SendError<PathBuf>>()
                        && error(err, &msg_send).is_err()
                    {
                        let _ = msg_send.send(Message::Abort);
                    }
                }
            });

            // Only the threads hold senders now, the channel gets
            // disconnected when all of them finish.
            drop(msg_send);

            // `console` is `None` if stdout is not a tty, for instance when
            // it is redirected to a file.
            let mut console = if cfg!(feature = "logging") {
                None
            } else if io::stdout().is_tty() {
                SuperConsole::new()
            } else {
                None
            };

            output_messages(
                Duration::from_secs_f64(0.150),
                msg_recv,
                console.as_mut(),
                state.as_ref(),
            )?;

            if let Some(console) = console {
                console.finalize(state.as_ref())?;
            }

            Ok::<_, anyhow::Error>(())
        })
        .map_err(|_| anyhow!("a worker thread panicked"))??;

        Arc::try_unwrap(state)
            .map_err(|_| anyhow!("state is still in use by another thread"))
    }
}

/// Prints the messages received from the workers until the channel is
/// disconnected or some of them sends [`Message::Abort`]. The state is
/// rendered once every `render_period`.
fn output_messages<S>(
    render_period: Duration,
    msg_recv: Receiver<Message>,
    mut console: Option<&mut SuperConsole>,
    state: &S,
) -> anyhow::Result<()>
where
    S: Component,
{
    let mut last_render = Instant::now();

    loop {
        match msg_recv.recv_timeout(render_period) {
            Ok(Message::Info(s)) => match console.as_mut() {
                Some(console) => console
                    .emit(Lines::from_colored_multiline_string(s.as_str())),
                None => println!("{s}"),
            },
            Ok(Message::Error(s)) => match console.as_mut() {
                Some(console) => console
                    .emit(Lines::from_colored_multiline_string(s.as_str())),
                None => eprintln!("{s}"),
            },
            Ok(Message::Abort) | Err(RecvTimeoutError::Disconnected) => {
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        if let Some(console) = console.as_mut() {
            if last_render.elapsed() > render_period {
                console.render(state)?;
                last_render = Instant::now();
            }
        }
    }

    Ok(())
}

/// Messages sent by workers to the console.
pub enum Message {
    /// Printed to stdout.
    Info(String),
    /// Printed to stderr.
    Error(String),
    /// Stops printing messages and aborts the walk.
    Abort,
}
