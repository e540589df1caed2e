use crate::reconcile::Event;
use chrono::{DateTime, Local};

/// Prints one line per event to stdout, stamped with the local time.
pub fn print_event(event: &Event) {
    println!("{}", format_event_line(event, Local::now()));
}

pub fn format_event_line(event: &Event, at: DateTime<Local>) -> String {
    format!(
        "{} {:<2} {} ({})",
        at.format("%Y-%m-%d %H:%M:%S%.3f"),
        event_code(event),
        event.path().display(),
        describe(event)
    )
}

fn event_code(event: &Event) -> &'static str {
    match event {
        Event::Tampered(_) => "M",
        Event::KindChanged(_) => "T",
        Event::FileDeleted(_) | Event::DirDeleted(_) => "R",
        Event::FileCreated(_) | Event::DirCreated(_) => "A",
        Event::KillSwitch(_) => "X",
    }
}

fn describe(event: &Event) -> &'static str {
    match event {
        Event::Tampered(_) => "file tampered, restoring",
        Event::KindChanged(_) => "type changed, restoring",
        Event::FileDeleted(_) => "file deleted, restoring",
        Event::DirDeleted(_) => "directory deleted, restoring",
        Event::FileCreated(_) => "file created, removing",
        Event::DirCreated(_) => "directory created, removing",
        Event::KillSwitch(_) => "kill switch found, removing and exiting",
    }
}
