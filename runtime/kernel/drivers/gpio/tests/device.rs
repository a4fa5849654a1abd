// Licensed under the Apache-2.0 license

use ambt53_config::GPIO_BASE_ADDR;
use ambt53_emulator::EmulatedGpio;
use ambt53_error::Ambt53Error;
use ambt53_gpio::registers;
use ambt53_gpio::{
    Direction, EdgeSelect, GpioClient, GpioConfig, GpioDevice, PinConfig, Polarity, ReadSource,
    Trigger,
};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::cell::RefCell;

fn setup_logger() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
}

#[derive(Default)]
struct Recorder {
    pins: RefCell<Vec<u8>>,
}

impl GpioClient for Recorder {
    fn interrupt(&self, pin: u8) {
        self.pins.borrow_mut().push(pin);
    }
}

#[test]
fn test_pin_config_set_and_get() {
    setup_logger();
    let gpio = EmulatedGpio::default();
    let device = GpioDevice::new(&gpio, GpioConfig::default());

    device.configure(5, &PinConfig::OUTPUT).unwrap();
    assert_eq!(device.pin_config(5).unwrap(), PinConfig::OUTPUT);
    assert_eq!(gpio.register(0, registers::DIR), 1 << 5);
    assert_eq!(gpio.register(0, registers::CTRL), 0);

    let level = PinConfig {
        direction: Direction::Input,
        trigger: Trigger::Level,
        edges: EdgeSelect::Both,
        polarity: Polarity::Positive,
        debounce: true,
        debounce_value: 0x40,
    };
    device.configure(40, &level).unwrap();
    assert_eq!(device.pin_config(40).unwrap(), level);
    assert_eq!(gpio.register(1, registers::IS), 1 << 8);
    assert_eq!(gpio.register(1, registers::DB), 1 << 8);
    assert_eq!(gpio.register(1, registers::DFG), 0x40);
    // group 0 is untouched by a group 1 pin
    assert_eq!(device.pin_config(6).unwrap(), PinConfig::default());

    // reconfiguring clears the bits it set before
    device.configure(5, &PinConfig::default()).unwrap();
    assert_eq!(gpio.register(0, registers::DIR), 0);
    assert_eq!(gpio.register(0, registers::IEV), 0);

    gpio.clear_writes();
    assert_eq!(
        device.configure(44, &PinConfig::INPUT),
        Err(Ambt53Error::InvalidArg)
    );
    let stuck_filter = PinConfig {
        debounce: true,
        debounce_value: u32::MAX,
        ..PinConfig::INPUT
    };
    assert_eq!(
        device.configure(3, &stuck_filter),
        Err(Ambt53Error::InvalidArg)
    );
    assert_eq!(device.pin_config(44), Err(Ambt53Error::InvalidArg));
    assert!(gpio.writes().is_empty());
}

#[test]
fn test_pin_read_and_write() {
    setup_logger();
    let gpio = EmulatedGpio::default();
    let device = GpioDevice::new(&gpio, GpioConfig::default());

    device.configure(3, &PinConfig::OUTPUT).unwrap();
    gpio.clear_writes();
    device.write_pin(3, true).unwrap();
    assert!(device.read_pin(3, ReadSource::Output).unwrap());
    device.write_pin(3, false).unwrap();
    assert!(!device.read_pin(3, ReadSource::Output).unwrap());
    assert_eq!(
        gpio.writes(),
        [
            (GPIO_BASE_ADDR + registers::SET, 1 << 3),
            (GPIO_BASE_ADDR + registers::CLR, 1 << 3),
        ]
    );

    device.write_pin(42, true).unwrap();
    assert_eq!(gpio.register(1, registers::ODATA), 1 << 10);

    gpio.drive(7, true);
    assert!(device.read_pin(7, ReadSource::Input).unwrap());
    assert!(!device.read_pin(7, ReadSource::Output).unwrap());
    assert!(!device.read_pin(8, ReadSource::Input).unwrap());

    assert_eq!(device.write_pin(44, true), Err(Ambt53Error::InvalidArg));
    assert_eq!(
        device.read_pin(50, ReadSource::Input),
        Err(Ambt53Error::InvalidArg)
    );
}

#[test]
fn test_interrupt_control() {
    setup_logger();
    let gpio = EmulatedGpio::default();
    let device = GpioDevice::new(&gpio, GpioConfig::default());
    gpio.set_register(1, registers::IM, 0xFFF);

    device.interrupt_enable(40).unwrap();
    assert_eq!(gpio.register(1, registers::IEN), 1 << 8);
    assert_eq!(gpio.register(1, registers::IM), 0xFFF & !(1 << 8));
    device.interrupt_disable(40).unwrap();
    assert_eq!(gpio.register(1, registers::IEN), 0);
    assert_eq!(gpio.register(1, registers::IM), 0xFFF);

    device
        .interrupt_enable_mask((1 << 2) | (1 << 31) | (1 << 43))
        .unwrap();
    assert_eq!(gpio.register(0, registers::IEN), (1 << 2) | (1 << 31));
    assert_eq!(gpio.register(1, registers::IEN), 1 << 11);
    device.interrupt_disable_mask(1 << 31).unwrap();
    assert_eq!(gpio.register(0, registers::IEN), 1 << 2);
    assert_eq!(gpio.register(1, registers::IEN), 1 << 11);

    assert_eq!(
        device.interrupt_enable_mask(1 << 44),
        Err(Ambt53Error::InvalidArg)
    );
    assert_eq!(device.interrupt_enable(44), Err(Ambt53Error::InvalidArg));
    assert_eq!(
        device.interrupt_status(2, false),
        Err(Ambt53Error::InvalidArg)
    );
}

#[test]
fn test_interrupt_register_and_service() {
    setup_logger();
    let gpio = EmulatedGpio::default();
    let low = Recorder::default();
    let high = Recorder::default();
    let device = GpioDevice::new(&gpio, GpioConfig::default());

    device.configure(2, &PinConfig::INPUT).unwrap();
    let both = PinConfig {
        edges: EdgeSelect::Both,
        ..PinConfig::INPUT
    };
    device.configure(33, &both).unwrap();
    device.register_interrupt(2, &low).unwrap();
    device.register_interrupt(33, &high).unwrap();
    device.interrupt_enable(2).unwrap();
    device.interrupt_enable(33).unwrap();

    gpio.drive(2, true);
    gpio.drive(33, true);
    assert!(gpio.interrupt_pending());
    assert_eq!(device.interrupt_status(0, true).unwrap(), 1 << 2);
    device.handle_interrupt(0).unwrap();
    device.handle_interrupt(1).unwrap();
    assert!(!gpio.interrupt_pending());
    assert_eq!(*low.pins.borrow(), [2]);
    assert_eq!(*high.pins.borrow(), [33]);

    // falling edge: only the both-edges pin fires
    gpio.drive(2, false);
    gpio.drive(33, false);
    device.handle_interrupt(0).unwrap();
    device.handle_interrupt(1).unwrap();
    assert_eq!(low.pins.borrow().len(), 1);
    assert_eq!(*high.pins.borrow(), [33, 33]);

    // nothing pending is a no-op
    gpio.clear_writes();
    device.handle_interrupt(0).unwrap();
    assert!(gpio.writes().is_empty());

    // enabled but unhandled pins still let the handled ones run
    device.unregister_interrupt(33).unwrap();
    assert_eq!(
        device.service_interrupt(1, (1 << 1) | (1 << 3)),
        Err(Ambt53Error::InvalidOperation)
    );
    assert_eq!(
        device.service_interrupt(0, (1 << 2) | (1 << 9)),
        Err(Ambt53Error::InvalidOperation)
    );
    assert_eq!(*low.pins.borrow(), [2, 2]);
    assert_eq!(high.pins.borrow().len(), 2);
}

#[test]
fn test_status_filter_and_clear() {
    setup_logger();
    let gpio = EmulatedGpio::default();
    let device = GpioDevice::new(&gpio, GpioConfig::default());
    gpio.set_register(0, registers::RIS, 0b1010);
    gpio.set_register(0, registers::IEN, 0b0010);

    assert_eq!(device.interrupt_status(0, false).unwrap(), 0b1010);
    assert_eq!(device.interrupt_status(0, true).unwrap(), 0b0010);
    device.interrupt_clear(0, 0b1000).unwrap();
    assert_eq!(gpio.register(0, registers::RIS), 0b0010);

    gpio.fail_reads(1);
    assert_eq!(device.interrupt_status(0, false), Err(Ambt53Error::Fail));
    assert_eq!(device.interrupt_status(0, false).unwrap(), 0b0010);
}
