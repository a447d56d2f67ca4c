//! Translation between bridge requests and MongoDB driver options, and from
//! driver errors back to [`DriverError`]s.

use bson::{Bson, Document};
use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{
        Acknowledgment as MongoAcknowledgment, CountOptions as MongoCountOptions,
        CursorType as MongoCursorType, FindOptions as MongoFindOptions, Hint as MongoHint,
        ReadPreference as MongoReadPreference, ReadPreferenceOptions, RunCursorCommandOptions,
        SelectionCriteria, WriteConcern as MongoWriteConcern,
    },
};
use std::{collections::HashMap, time::Duration};
use tracing::warn;

use docbridge_core::{
    error::{DriverError, DriverErrorKind},
    options::{CommandOptions, CountOptions, CursorType, FindOptions, Hint},
    params::{Acknowledgment, ReadPreference, ReadPreferenceMode, WriteConcern},
};

const MAX_TIME_MS_EXPIRED: i32 = 50;

pub(crate) fn selection_criteria(read_preference: &ReadPreference) -> SelectionCriteria {
    let options = if read_preference.tag_sets.is_empty() {
        None
    } else {
        let tag_sets = read_preference
            .tag_sets
            .iter()
            .map(|tags| {
                tags.iter()
                    .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
                    .collect::<HashMap<_, _>>()
            })
            .collect();

        let mut options = ReadPreferenceOptions::default();
        options.tag_sets = Some(tag_sets);
        Some(options)
    };

    SelectionCriteria::ReadPreference(match read_preference.mode {
        ReadPreferenceMode::Primary => MongoReadPreference::Primary,
        ReadPreferenceMode::PrimaryPreferred => MongoReadPreference::PrimaryPreferred { options },
        ReadPreferenceMode::Secondary => MongoReadPreference::Secondary { options },
        ReadPreferenceMode::SecondaryPreferred => MongoReadPreference::SecondaryPreferred { options },
        ReadPreferenceMode::Nearest => MongoReadPreference::Nearest { options },
    })
}

pub(crate) fn write_concern(write_concern: &WriteConcern) -> MongoWriteConcern {
    let mut mapped = MongoWriteConcern::default();
    mapped.w = Some(match &write_concern.w {
        Acknowledgment::Nodes(n) => MongoAcknowledgment::Nodes(*n),
        Acknowledgment::Tag(tag) if tag == "majority" => MongoAcknowledgment::Majority,
        Acknowledgment::Tag(tag) => MongoAcknowledgment::Custom(tag.clone()),
    });
    if write_concern.timeout_ms > 0 {
        mapped.w_timeout = Some(Duration::from_millis(write_concern.timeout_ms));
    }
    mapped
}

fn hint(hint: Hint) -> MongoHint {
    match hint {
        Hint::Keys(keys) => MongoHint::Keys(keys),
        Hint::Name(name) => MongoHint::Name(name),
    }
}

/// Applies legacy query modifiers the driver exposes as find options.
fn apply_modifiers(mapped: &mut MongoFindOptions, modifiers: Document) {
    for (name, value) in modifiers {
        match (name.as_str(), value) {
            ("$comment", comment) => mapped.comment = Some(comment),
            ("$min", Bson::Document(min)) => mapped.min = Some(min),
            ("$max", Bson::Document(max)) => mapped.max = Some(max),
            ("$returnKey", Bson::Boolean(flag)) => mapped.return_key = Some(flag),
            ("$showDiskLoc", Bson::Boolean(flag)) => mapped.show_record_id = Some(flag),
            (name, value) => warn!(modifier = name, %value, "ignoring unsupported query modifier"),
        }
    }
}

pub(crate) fn find_options(options: FindOptions) -> MongoFindOptions {
    let mut mapped = MongoFindOptions::default();

    mapped.projection = options.projection;
    mapped.sort = options.sort;
    mapped.skip = options.skip;
    mapped.limit = options.limit;
    mapped.batch_size = options.batch_size;
    mapped.cursor_type = options.cursor_type.map(|cursor_type| match cursor_type {
        CursorType::Tailable => MongoCursorType::Tailable,
        CursorType::TailableAwait => MongoCursorType::TailableAwait,
    });
    if options.no_cursor_timeout {
        mapped.no_cursor_timeout = Some(true);
    }
    if options.allow_partial_results {
        mapped.allow_partial_results = Some(true);
    }
    mapped.max_time = options.max_time;
    mapped.hint = options.hint.map(hint);
    mapped.selection_criteria = options.read_preference.as_ref().map(selection_criteria);
    apply_modifiers(&mut mapped, options.modifiers);

    mapped
}

pub(crate) fn count_options(options: CountOptions) -> MongoCountOptions {
    let mut mapped = MongoCountOptions::default();

    mapped.skip = options.skip;
    mapped.limit = options.limit;
    mapped.hint = options.hint.map(hint);
    mapped.max_time = options.max_time;
    mapped.selection_criteria = options.read_preference.as_ref().map(selection_criteria);

    mapped
}

pub(crate) fn command_options(options: CommandOptions) -> RunCursorCommandOptions {
    let mut mapped = RunCursorCommandOptions::default();

    mapped.batch_size = options.batch_size;
    mapped.max_time = options.max_time;
    mapped.selection_criteria = options.read_preference.as_ref().map(selection_criteria);

    mapped
}

/// Reclassifies a driver error into the kinds the taxonomy understands,
/// keeping the server code when there is one.
pub(crate) fn driver_error(error: MongoError) -> DriverError {
    let message = error.to_string();

    match error.kind.as_ref() {
        ErrorKind::Authentication { .. } => DriverError::new(DriverErrorKind::Authentication, message),
        ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => DriverError::connection(message),
        ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            DriverError::new(DriverErrorKind::ConnectionTimeout, message)
        }
        ErrorKind::Io(_) => DriverError::connection(message),
        ErrorKind::InvalidTlsConfig { .. } => DriverError::new(DriverErrorKind::SslConnection, message),
        ErrorKind::Command(command) if command.code == MAX_TIME_MS_EXPIRED => {
            DriverError::new(DriverErrorKind::ExecutionTimeout, command.message.clone())
                .with_code(command.code)
        }
        ErrorKind::Command(command) => DriverError::command(command.code, command.message.clone()),
        ErrorKind::Write(WriteFailure::WriteError(write)) => {
            DriverError::new(DriverErrorKind::Write, write.message.clone()).with_code(write.code)
        }
        ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => {
            DriverError::new(DriverErrorKind::Write, concern.message.clone()).with_code(concern.code)
        }
        _ => DriverError::other(message),
    }
}
