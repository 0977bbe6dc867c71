#![no_main]

use std::rc::Rc;

use libfuzzer_sys::fuzz_target;
use playsync_observe::transport::decode;
use playsync_observe::{
    BaseObservation, ChannelPort, ContentId, MainThreadMessage, PlaybackObserver, WorkerMessage,
    WorkerObservationReceiver, WorkerPort,
};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = decode::<WorkerMessage>(text);

    let Ok(message) = decode::<MainThreadMessage>(text) else {
        return;
    };
    let (worker_port, _main_port) = ChannelPort::pair();
    let worker_port: WorkerPort = worker_port;
    let receiver = WorkerObservationReceiver::new(
        Rc::new(worker_port),
        message.content_id().clone(),
        BaseObservation::initial(),
    );
    assert!(receiver.on_message(message));
    let _ = receiver.observer().reference().get();
});
