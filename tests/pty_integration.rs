//! Integration tests that spawn real, short-lived child processes over a real PTY.
//! Unlike the unit tests inline in `src/`, these exercise the actual `fork`/`exec`/
//! `poll` path and so are serialised: each test owns file descriptors and signal
//! state a parallel test thread could otherwise race on.

use serial_test::serial;

use vtmux::buffer::{Buffer, ReadOutcome};
use vtmux::pal::{pal_poll, PalPollFd, PollFlags};
use vtmux::pty;

/// Polls `fd` for up to `iterations` rounds of `timeout_ms`, returning the first
/// non-empty `revents` seen (or an empty mask if the deadline passes).
fn wait_ready(fd: std::os::unix::io::RawFd, timeout_ms: i32, iterations: usize) -> PollFlags {
    for _ in 0..iterations {
        let mut fds = [PalPollFd::new(fd, PollFlags::IN)];
        match pal_poll(&mut fds, timeout_ms) {
            Ok(0) => continue,
            Ok(_) => return fds[0].revents,
            Err(_) => return PollFlags::empty(),
        }
    }
    PollFlags::empty()
}

#[test]
#[serial]
fn buffer_spawn_runs_a_child_and_captures_its_output() {
    let mut buffer = Buffer::spawn(0, "/bin/echo hello-vtmux", "test-session", 24, 80)
        .expect("spawning /bin/echo should succeed");

    let mut saw_data = false;
    let mut exited = false;
    for _ in 0..50 {
        let revents = wait_ready(buffer.master_fd, 200, 1);
        if revents.is_empty() {
            continue;
        }
        match buffer.handle_readable(revents).expect("read should not error") {
            ReadOutcome::Data(bytes) => {
                if !bytes.is_empty() {
                    saw_data = true;
                }
            }
            ReadOutcome::Exited => {
                exited = true;
                break;
            }
        }
    }

    assert!(saw_data, "expected to read at least one chunk of echo's output");
    assert!(exited, "expected the child to eventually exit and report HUP/EOF");

    // The VT should have captured the echoed text somewhere in row 0.
    let mut row_text = Vec::new();
    for col in 0..buffer.vt.cols {
        row_text.push(buffer.vt.get_cell(0, col).display_byte());
    }
    let row_text = String::from_utf8_lossy(&row_text);
    assert!(row_text.contains("hello-vtmux"), "row 0 was {row_text:?}");
}

#[test]
#[serial]
fn buffer_spawn_reports_exit_for_a_process_that_exits_immediately() {
    let mut buffer =
        Buffer::spawn(1, "/bin/true", "test-session", 24, 80).expect("spawning /bin/true should succeed");

    let mut exited = false;
    for _ in 0..50 {
        let revents = wait_ready(buffer.master_fd, 200, 1);
        if revents.is_empty() {
            continue;
        }
        if matches!(buffer.handle_readable(revents).unwrap(), ReadOutcome::Exited) {
            exited = true;
            break;
        }
    }
    assert!(exited, "expected /bin/true's pty master to report HUP/EOF promptly");
}

#[test]
#[serial]
fn tty_winsize_round_trips_through_a_real_pty_master() {
    let spawned = pty::tty_new("/bin/sleep 5", 2, "test-session").expect("spawning /bin/sleep should succeed");

    pty::tty_set_winsize(spawned.master_fd, 40, 100).expect("setting winsize should succeed");
    let (rows, cols) = pty::tty_get_winsize(spawned.master_fd).expect("getting winsize should succeed");
    assert_eq!((rows, cols), (40, 100));

    // Tear the child down rather than waiting out the sleep.
    let _ = nix::sys::signal::kill(spawned.child_pid, nix::sys::signal::Signal::SIGKILL);
    let _ = nix::sys::wait::waitpid(spawned.child_pid, None);
    let _ = nix::unistd::close(spawned.master_fd);
}
