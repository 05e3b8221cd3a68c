//! Session Exchange Tests
//!
//! A scripted device answers each frame the session writes.

use firmil_runtime::{RuntimeError, Session, SessionConfig, TaskOutcome, UploadState};
use firmil_types::{MethodFlags, NativeMethod, SystemException, TaskState, Token, Value};
use firmil_wire::{CommandError, ExecutorCommand, MessageEncoder, PinMode, SystemVariable, packing};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

type Link = mpsc::UnboundedSender<Vec<u8>>;

fn config() -> SessionConfig {
    SessionConfig::default().reply_timeout(Duration::from_millis(200))
}

/// Spawn a device that answers every written frame with `respond`
fn device<F>(config: SessionConfig, mut respond: F) -> Arc<Session<Link>>
where
    F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let session = Arc::new(Session::new(tx, config));
    let weak = Arc::downgrade(&session);
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Some(session) = weak.upgrade() else {
                break;
            };
            for reply in respond(&frame) {
                let _ = session.feed(&reply);
            }
        }
    });
    session
}

fn is_il(frame: &[u8], command: ExecutorCommand) -> bool {
    frame.len() > 4 && frame[1] == 0x7B && frame[2] == 0x7F && frame[3] == command.to_byte()
}

fn ack(frame: &[u8]) -> Vec<u8> {
    vec![0xF0, 0x7B, 0x7F, frame[3], 0x00, frame[4], 0xF7]
}

fn nack(frame: &[u8], error: CommandError) -> Vec<u8> {
    vec![0xF0, 0x7B, 0x7E, frame[3], error as u8, frame[4], 0xF7]
}

fn termination(id: [u8; 2], state: u8, ints: &[u32]) -> Vec<u8> {
    let mut reply = vec![0xF0, 0x7B, 0x7D, 0x01, id[0], id[1], state, ints.len() as u8];
    for value in ints {
        packing::put_u32(&mut reply, *value);
    }
    reply.push(0xF7);
    reply
}

fn completed(id: [u8; 2]) -> Vec<u8> {
    vec![0xF0, 0x7B, 0x7D, 0x01, id[0], id[1], 0x00, 0x00, 0xF7]
}

fn program_frames() -> Vec<firmil_wire::Frame> {
    let token = Token::new(21);
    let mut encoder = MessageEncoder::default();
    let mut frames = vec![
        encoder
            .declare_method(token, MethodFlags::default(), 1, 0, NativeMethod::None)
            .unwrap(),
    ];
    frames.extend(encoder.load_il(token, &[0x2A]).unwrap());
    frames
}

fn capabilities(version: u16, max_message_size: u32) -> Vec<u8> {
    let mut reply = vec![0xF0, 0x7B, 0x7D, 0x13, 0x00];
    packing::put_int14(&mut reply, version);
    reply.extend([4, 4]);
    packing::put_u32(&mut reply, 256 * 1024);
    packing::put_u32(&mut reply, 0);
    packing::put_u32(&mut reply, 32 * 1024);
    packing::put_u32(&mut reply, max_message_size);
    reply.push(0xF7);
    reply
}

/// Task id bytes of a StartTask frame follow the 5-byte method token
fn task_id_of(frame: &[u8]) -> [u8; 2] {
    [frame[10], frame[11]]
}

#[tokio::test]
async fn test_nacked_upload_is_not_committed() {
    let session = device(config(), |frame| {
        if is_il(frame, ExecutorCommand::LoadIl) {
            vec![nack(frame, CommandError::Timeout)]
        } else {
            vec![ack(frame)]
        }
    });

    let token = Token::new(21);
    let mut encoder = MessageEncoder::default();
    let flags = MethodFlags {
        is_static: true,
        is_void: true,
        ..Default::default()
    };
    let mut frames = vec![encoder.declare_method(token, flags, 1, 0, NativeMethod::None).unwrap()];
    frames.extend(encoder.load_il(token, &[0x00, 0x2A]).unwrap());

    let upload = session.upload(&frames).await;
    assert_eq!(upload.state, UploadState::NotCommitted);
    assert_eq!(upload.acknowledged, 1);
    assert_eq!(upload.failed_command, Some(ExecutorCommand::LoadIl));
    let error = upload.error.expect("failure recorded");
    assert!(error.is_recoverable());
    assert_eq!(error.command_error(), Some(CommandError::Timeout));
    assert_eq!(session.last_error(), CommandError::Timeout);
    assert!(!session.is_poisoned());
}

#[tokio::test]
async fn test_acknowledged_upload_commits() {
    let session = device(config(), |frame| vec![ack(frame)]);
    let token = Token::new(21);
    let mut encoder = MessageEncoder::default();
    let mut frames = vec![
        encoder
            .declare_method(token, MethodFlags::default(), 1, 0, NativeMethod::None)
            .unwrap(),
    ];
    frames.extend(encoder.load_il(token, &[0x2A]).unwrap());

    let upload = session.upload(&frames).await;
    assert!(upload.is_committed());
    assert_eq!(upload.into_result().unwrap(), 2);
    assert_eq!(session.last_error(), CommandError::None);
}

#[tokio::test]
async fn test_fault_ends_task_only() {
    let session = device(config(), |frame| {
        if is_il(frame, ExecutorCommand::StartTask) {
            vec![ack(frame), termination(task_id_of(frame), 3, &[5, 21])]
        } else if frame[1] == 0x63 {
            let mut reply = frame[..8].to_vec();
            packing::put_i32(&mut reply, 64);
            reply.push(0xF7);
            vec![reply]
        } else {
            vec![ack(frame)]
        }
    });

    let task = session.start_task(Token::new(21), &[Value::Int32(7)]).await.unwrap();
    let outcome = task.wait(Duration::from_secs(1)).await.unwrap();
    assert!(matches!(
        outcome,
        TaskOutcome::Faulted {
            exception: Some(SystemException::DivideByZero),
            location: Some(t),
            ..
        } if t == Token::new(21)
    ));
    assert_eq!(task.state(), TaskState::KilledByException);

    let size = session
        .system_variable(SystemVariable::MaxSysexSize, None)
        .await
        .unwrap();
    assert_eq!(size, 64);
    assert_eq!(session.dispose(task).await.unwrap(), TaskState::KilledByException);
    assert!(session.tasks().is_empty());
}

#[tokio::test]
async fn test_completed_task_result() {
    let session = device(config(), |frame| {
        let mut replies = vec![ack(frame)];
        if is_il(frame, ExecutorCommand::StartTask) {
            let id = task_id_of(frame);
            let mut done = vec![0xF0, 0x7B, 0x7D, 0x01, id[0], id[1], 0x00, 0x04];
            packing::put_two_7bit(&mut done, &49i32.to_le_bytes());
            done.push(0xF7);
            replies.push(done);
        }
        replies
    });

    let task = session.start_task(Token::new(21), &[Value::Int32(7)]).await.unwrap();
    let outcome = task.wait(Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        outcome.value(firmil_types::VariableKind::Int32),
        Some(Value::Int32(49))
    );
}

#[tokio::test]
async fn test_dispose_is_advisory() {
    let session = device(config(), |frame| vec![ack(frame)]);

    let task = session.start_task(Token::new(21), &[]).await.unwrap();
    let id = task.id();
    let cancel = task.cancellation();
    assert_eq!(session.dispose(task).await.unwrap(), TaskState::Running);
    assert!(cancel.is_cancelled());
    assert_eq!(session.tasks().len(), 1);

    let lo = (id.value() & 0x7F) as u8;
    let hi = (id.value() >> 7) as u8;
    session.feed(&termination([lo, hi], 3, &[])).unwrap();
    assert!(session.tasks().is_empty());
}

#[tokio::test]
async fn test_protocol_mismatch_poisons_session() {
    let session = device(config(), |frame| {
        if is_il(frame, ExecutorCommand::QueryHardware) {
            vec![capabilities(2, 64)]
        } else {
            vec![ack(frame)]
        }
    });

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, RuntimeError::ProtocolMismatch { expected: 1, actual: 2 }));
    assert!(!err.is_recoverable());
    assert!(session.is_poisoned());
    assert!(matches!(
        session.reset_executor(false).await,
        Err(RuntimeError::Poisoned)
    ));
}

#[tokio::test]
async fn test_connect_adopts_message_size() {
    let session = device(config(), |frame| {
        if is_il(frame, ExecutorCommand::QueryHardware) {
            vec![capabilities(1, 40)]
        } else {
            vec![ack(frame)]
        }
    });

    let caps = session.connect().await.unwrap();
    assert_eq!(caps.max_message_size, 40);
    assert_eq!(session.max_message_size(), 40);
    assert_eq!(session.capabilities(), Some(caps));
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_retry_only_repeatable_commands() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let session = device(config(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Vec::new()
    });

    let err = session.reset_executor(false).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Timeout { .. }));
    assert!(err.is_recoverable());
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(session.last_error(), CommandError::Timeout);

    let frame = MessageEncoder::default()
        .load_il(Token::new(21), &[0x2A])
        .unwrap()
        .remove(0);
    assert!(session.command(&frame).await.is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_pin_operations() {
    let mut modes = [0u8; 2];
    let mut levels = [0u8; 2];
    let session = device(config(), move |frame| match frame[0] {
        0xF4 => {
            modes[usize::from(frame[1])] = frame[2];
            Vec::new()
        }
        0xF5 => {
            levels[usize::from(frame[1])] = frame[2];
            Vec::new()
        }
        0xD0 => vec![vec![0x90, levels[0] | (levels[1] << 1), 0x00]],
        0xF0 if frame[1] == 0x6B => vec![vec![
            0xF0, 0x6C, 0, 1, 1, 1, 0x7F, 0, 1, 1, 1, 3, 8, 0x7F, 0xF7,
        ]],
        0xF0 if frame[1] == 0x6D => {
            let pin = usize::from(frame[2]);
            vec![vec![0xF0, 0x6E, frame[2], modes[pin], levels[pin], 0xF7]]
        }
        _ => Vec::new(),
    });

    assert_eq!(session.pin_count().await.unwrap(), 2);
    assert!(session.supports_mode(1, PinMode::Pwm).await.unwrap());
    assert!(!session.supports_mode(0, PinMode::Pwm).await.unwrap());
    assert!(matches!(
        session.supports_mode(5, PinMode::Input).await,
        Err(RuntimeError::Pin { pin: 5, .. })
    ));

    session.set_pin_mode(1, PinMode::Output).await.unwrap();
    assert_eq!(session.pin_mode(1).await.unwrap(), PinMode::Output.to_byte());
    session.write_digital(1, true).await.unwrap();
    assert!(session.read_digital(1).await.unwrap());
    assert!(!session.read_digital(0).await.unwrap());
    assert!(session.set_pin_mode(0, PinMode::Pwm).await.is_err());
}

#[tokio::test]
async fn test_pump_feeds_reader() {
    let (tx, _rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let session = Session::new(tx, config());
    let inbound: &[u8] = &[0xF9, 2, 7, b'o', b'k', b'\n'];
    session.pump(inbound).await.unwrap();
    assert_eq!(session.firmata_version(), Some((2, 7)));
}

#[tokio::test]
async fn test_pump_records_undecodable_input() {
    let (tx, _rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let session = Session::new(tx, config());
    let inbound: &[u8] = &[0xF0, 0x7B, 0x7E, 0x03, 0x09, 0x01, 0xF7, 0xF9, 2, 7];
    session.pump(inbound).await.unwrap();
    assert!(session.last_inbound_error().is_some());
    assert_eq!(session.firmata_version(), Some((2, 7)));
}

#[tokio::test]
async fn test_device_reset_requires_new_upload() {
    let session = device(config(), |frame| {
        let mut replies = vec![ack(frame)];
        if is_il(frame, ExecutorCommand::StartTask) {
            replies.push(completed(task_id_of(frame)));
        }
        replies
    });
    session.feed(&[0xF9, 2, 7]).unwrap();
    let task = session.start_task(Token::new(21), &[]).await.unwrap();
    task.wait(Duration::from_secs(1)).await.unwrap();

    session.feed(&[0xF9, 2, 7]).unwrap();
    assert!(!session.is_program_loaded());
    assert!(matches!(
        session.start_task(Token::new(21), &[]).await,
        Err(RuntimeError::ProgramNotLoaded)
    ));

    assert!(session.upload(&program_frames()).await.is_committed());
    assert!(session.is_program_loaded());
    let task = session.start_task(Token::new(21), &[]).await.unwrap();
    assert!(matches!(
        task.wait(Duration::from_secs(1)).await.unwrap(),
        TaskOutcome::Completed(_)
    ));
}

#[tokio::test]
async fn test_failed_upload_blocks_tasks() {
    let session = device(config(), |frame| {
        if is_il(frame, ExecutorCommand::LoadIl) {
            vec![nack(frame, CommandError::OutOfMemory)]
        } else {
            vec![ack(frame)]
        }
    });
    assert!(!session.upload(&program_frames()).await.is_committed());
    assert!(matches!(
        session.start_task(Token::new(21), &[]).await,
        Err(RuntimeError::ProgramNotLoaded)
    ));
}

#[tokio::test]
async fn test_type_initializers_stop_at_first_failure() {
    const FAILING: u32 = 32;
    let started = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&started);
    let session = device(config(), move |frame| {
        let mut replies = vec![ack(frame)];
        if is_il(frame, ExecutorCommand::StartTask) {
            let token = packing::get_u32(frame, 5).unwrap();
            log.lock().unwrap().push(token);
            let id = task_id_of(frame);
            replies.push(if token == FAILING {
                termination(id, 1, &[5, token])
            } else {
                completed(id)
            });
        }
        replies
    });

    session.run_type_initializers(&[Token::new(31)]).await.unwrap();
    let err = session
        .run_type_initializers(&[Token::new(31), Token::new(FAILING), Token::new(33)])
        .await
        .unwrap_err();
    let RuntimeError::TypeInitializer { token, outcome } = err else {
        panic!("expected a type initializer failure, got {err}");
    };
    assert_eq!(token, Token::new(FAILING));
    assert!(matches!(
        *outcome,
        TaskOutcome::Faulted {
            exception: Some(SystemException::DivideByZero),
            ..
        }
    ));
    assert_eq!(*started.lock().unwrap(), vec![31, 31, FAILING]);
    assert!(session.tasks().is_empty());
}

#[tokio::test]
async fn test_disposed_task_evicted_after_grace() {
    let session = device(config().dispose_grace(Duration::ZERO), |frame| vec![ack(frame)]);

    let first = session.start_task(Token::new(21), &[]).await.unwrap();
    let cancel = first.cancellation();
    assert_eq!(session.dispose(first).await.unwrap(), TaskState::Running);
    assert_eq!(session.tasks().len(), 1);

    let second = session.start_task(Token::new(21), &[]).await.unwrap();
    assert!(cancel.is_cancelled());
    assert_eq!(session.tasks().len(), 1);
    assert_eq!(second.state(), TaskState::Running);
}
