use std::sync::Arc;

use tracing::debug;

use crate::{
    internals::core::{aim_writer::AimHandle, ports::ButtonSource},
    models::buttons::MouseButton,
};

/// Engages the aim writer while the configured device button is held.
/// Only edges are forwarded, so a release clears the target exactly once.
pub struct DeviceArming {
    source: Arc<dyn ButtonSource>,
    aim: AimHandle,
    button: MouseButton,
    engaged: bool,
}

impl DeviceArming {
    pub fn new(source: Arc<dyn ButtonSource>, aim: AimHandle, button: MouseButton) -> Self {
        Self {
            source,
            aim,
            button,
            engaged: false,
        }
    }

    pub fn button(&self) -> MouseButton {
        self.button
    }

    /// Sample the button once. Returns whether the writer is engaged.
    pub fn poll(&mut self) -> bool {
        let pressed = self.source.button_pressed(self.button);
        if pressed != self.engaged {
            debug!(
                "Aim button {} {}.",
                self.button,
                if pressed { "pressed" } else { "released" }
            );
            self.aim.set_engaged(pressed);
            self.engaged = pressed;
        }
        self.engaged
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Mutex,
        },
        thread,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::{
        config::DeviceConfig,
        externals::hardware::{
            controller::DeviceController,
            discovery::PortCandidate,
            mock::{MockBackend, MockProfile, MockWire},
        },
        internals::core::{
            aim_writer::AimWriter,
            dispatch::FeatureDispatcher,
            mock::{MockEntity, MockProcess},
            toggles::WriteToggles,
        },
        models::{
            buttons::{ButtonState, ButtonTable},
            vector::Vec3,
        },
    };

    struct Switch(AtomicBool);

    impl ButtonSource for Switch {
        fn button_pressed(&self, _button: MouseButton) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_edges_drive_engagement() {
        let switch = Arc::new(Switch(AtomicBool::new(false)));
        let aim = AimHandle::default();
        let mut arming = DeviceArming::new(switch.clone(), aim.clone(), MouseButton::Side1);

        assert!(!arming.poll());
        assert!(!aim.snapshot().is_engaged());

        switch.0.store(true, Ordering::SeqCst);
        assert!(arming.poll());
        aim.set_target(Some(Vec3::new(1f32, 2f32, 3f32)));
        assert!(aim.snapshot().is_armed());

        // Holding the button does not disturb the target.
        assert!(arming.poll());
        assert!(aim.snapshot().is_armed());

        switch.0.store(false, Ordering::SeqCst);
        assert!(!arming.poll());
        assert!(!aim.snapshot().is_engaged());
        assert_eq!(aim.snapshot().target(), None);
    }

    #[test]
    fn test_reads_configured_button() {
        let table = Arc::new(ButtonTable::new());
        let aim = AimHandle::default();
        let mut arming = DeviceArming::new(table.clone(), aim.clone(), MouseButton::Side1);

        table.publish(ButtonState::from_mask(0x01));
        assert!(!arming.poll());

        table.publish(ButtonState::from_mask(0x08));
        assert!(arming.poll());
        assert!(aim.snapshot().is_engaged());
    }

    fn connected_controller() -> (Arc<DeviceController>, Arc<Mutex<MockWire>>) {
        let backend = Arc::new(MockBackend::new().with_device(
            PortCandidate::usb("COM3", 0x0403, 0x6001, None, "FT232R USB UART"),
            MockProfile::Generic { version: None },
        ));
        let settings = DeviceConfig {
            settle_delay_ms: 0,
            validation_timeout_ms: 20,
            ..Default::default()
        };
        let controller = Arc::new(DeviceController::new(backend.clone(), settings));
        controller.connect_generic("COM3").expect("Should connect");
        (controller, backend.wire("COM3"))
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_link_loss_disengages() {
        let (controller, wire) = connected_controller();
        let aim = AimHandle::default();
        let mut arming = DeviceArming::new(controller.clone(), aim.clone(), MouseButton::Side1);
        wire.lock().unwrap().inbound.extend([0x08]);
        assert!(wait_until(|| arming.poll()));
        assert!(aim.snapshot().is_engaged());

        wire.lock().unwrap().fail_reads = true;

        assert!(wait_until(|| !controller.is_connected()));
        assert!(!arming.poll());
        assert!(!aim.snapshot().is_engaged());
    }

    #[test]
    fn test_concurrent_updates_never_tear() {
        let (controller, wire) = connected_controller();
        let toggles = Arc::new(WriteToggles::new(true, true));
        let writer = AimWriter::new(toggles.clone());
        let aim = writer.handle();
        let mut dispatcher = FeatureDispatcher::new(toggles);
        dispatcher.register(Box::new(writer));
        let mut arming = DeviceArming::new(controller.clone(), aim.clone(), MouseButton::Left);
        let process = MockProcess::new();
        let entity = MockEntity::at(Vec3::new(1f32, 1f32, 1f32));

        let feeder_wire = wire.clone();
        let feeder = thread::spawn(move || {
            for i in 0..1000 {
                let mask = if i % 2 == 0 { 0x00 } else { 0x1F };
                feeder_wire.lock().unwrap().inbound.push_back(mask);
                let deadline = Instant::now() + Duration::from_secs(2);
                while !feeder_wire.lock().unwrap().inbound.is_empty() && Instant::now() < deadline {
                    thread::yield_now();
                }
            }
        });

        for _ in 0..1000 {
            arming.poll();
            aim.set_target(Some(Vec3::new(10f32, 0f32, 0f32)));
            dispatcher.apply(&process, Some(&entity));

            let entries = controller.buttons().entries();
            assert_eq!(entries.len(), 5);
            let pressed = entries.iter().filter(|(_, pressed)| *pressed).count();
            assert!(pressed == 0 || pressed == 5);
            for (index, (id, _)) in entries.iter().enumerate() {
                assert_eq!(*id as usize, index + 1);
            }

            // Whatever the button did, an armed target never survives a cycle.
            assert!(!aim.snapshot().is_armed());
        }

        feeder.join().unwrap();
        assert!(controller.is_connected());
    }
}
