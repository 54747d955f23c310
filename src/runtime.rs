//! Async dispatch loop over Embassy channels.
//!
//! One task owns the [`SessionController`] and is its only caller. It waits
//! on two inputs, application commands and host stack events, handles
//! whichever arrives first to completion, then forwards everything the
//! controller queued:
//!
//! ```text
//!   AppCommand ──┐                        ┌──► StackRequest
//!                ├─► SessionController ───┤
//!   StackEvent ──┘                        └──► AppEvent
//! ```

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Receiver, Sender};

use crate::controller::SessionController;
use crate::message::{AppCommand, AppEvent, StackEvent, StackRequest};

/// One unit of work for the controller.
pub enum Input {
    Command(AppCommand),
    Stack(StackEvent),
}

/// Apply one input and flush the controller's outboxes.
///
/// Rejected commands need no handling here: the controller already queued
/// an [`AppEvent::Rejected`] for them.
pub async fn dispatch<M: RawMutex, const NR: usize, const NA: usize>(
    controller: &mut SessionController,
    input: Input,
    requests: &Sender<'_, M, StackRequest, NR>,
    app_events: &Sender<'_, M, AppEvent, NA>,
) {
    match input {
        Input::Command(cmd) => {
            let _ = controller.execute(cmd);
        }
        Input::Stack(event) => controller.handle(event),
    }

    while let Some(request) = controller.next_request() {
        requests.send(request).await;
    }
    while let Some(event) = controller.next_event() {
        app_events.send(event).await;
    }
}

/// Run the controller forever.
pub async fn run<
    M: RawMutex,
    const NC: usize,
    const NS: usize,
    const NR: usize,
    const NA: usize,
>(
    controller: &mut SessionController,
    commands: &Receiver<'_, M, AppCommand, NC>,
    stack_events: &Receiver<'_, M, StackEvent, NS>,
    requests: &Sender<'_, M, StackRequest, NR>,
    app_events: &Sender<'_, M, AppEvent, NA>,
) -> ! {
    if controller.boot().is_err() {
        warn!("RUNTIME: controller already booted");
    }
    while let Some(request) = controller.next_request() {
        requests.send(request).await;
    }

    loop {
        let input = match select(commands.receive(), stack_events.receive()).await {
            Either::First(cmd) => Input::Command(cmd),
            Either::Second(event) => Input::Stack(event),
        };
        dispatch(controller, input, requests, app_events).await;
    }
}
