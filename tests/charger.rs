mod common;

use common::{SAMPLE_NOTHING, SAMPLE_ONE_AMP, MUX_ADCIN1, attach, fast_config, new_pmu, usb_tier};
use embassy_futures::join::join;
use embassy_futures::{block_on, yield_now};
use pcf50633_rs::data_types::{ChargerType, DispatchOutcome, Features, PmuEvent, StatusFlags, UsbCurrentTier};
use pcf50633_rs::registers::{Mbcc1, addr};

#[test]
fn host_port_at_attach_gets_100ma() {
    let (pmu, bus, platform) = new_pmu(fast_config());
    bus.usb_power(true);
    bus.set_reg(addr::MBCC7, 0x03);
    block_on(attach(&pmu));

    assert!(pmu.flags().contains(StatusFlags::USB_PRESENT));
    assert_eq!(usb_tier(&bus), UsbCurrentTier::Ma100.bits());
    assert_eq!(pmu.last_current_limit(), 100);
    assert_eq!(bus.reg(addr::MBCC5), 0xFF);
    assert!(!pmu.flags().contains(StatusFlags::CHG_ENABLED));
    assert_eq!(
        platform.events(),
        [PmuEvent::UsbInsert, PmuEvent::ChargerActive, PmuEvent::ChargerIdle]
    );
}

#[test]
fn dropping_from_fast_charge_to_host_tier_ends_idle() {
    let (pmu, bus, platform) = new_pmu(fast_config());
    bus.usb_power(true);
    block_on(async {
        attach(&pmu).await;
        pmu.set_current_limit(500).await.unwrap();
        platform.clear();
        pmu.set_current_limit(100).await.unwrap();
        pmu.set_current_limit(0).await.unwrap();
    });
    assert_eq!(bus.reg(addr::MBCC1) & Mbcc1::CHGENA.bits(), 0);
    assert_eq!(
        platform.events(),
        [
            PmuEvent::ChargerActive,
            PmuEvent::ChargerIdle,
            PmuEvent::ChargerActive,
            PmuEvent::ChargerIdle,
        ]
    );
}

#[test]
fn dedicated_charger_gets_1a_and_releases_gpo() {
    let (pmu, bus, platform) = new_pmu(fast_config());
    bus.usb_power(true);
    bus.set_adc_sample(MUX_ADCIN1, SAMPLE_ONE_AMP);
    bus.set_reg(addr::GPOCFG, 0x37);
    block_on(attach(&pmu));

    assert_eq!(usb_tier(&bus), UsbCurrentTier::Ma1000.bits());
    assert_eq!(bus.reg(addr::GPOCFG), 0x30);
    assert!(pmu.flags().contains(StatusFlags::CHG_ENABLED));
    assert_eq!(bus.reg(addr::MBCC1) & Mbcc1::CHGENA.bits(), Mbcc1::CHGENA.bits());
    assert_eq!(platform.count(PmuEvent::ChargerActive), 1);

    let (status, _) = block_on(join(pmu.charger_type(), async {
        while pmu.adc_pending() == 0 {
            yield_now().await;
        }
        pmu.dispatch().await;
    }));
    let status = status.unwrap();
    assert_eq!(status.charger, ChargerType::OneAmp);
    assert_eq!(status.tier, UsbCurrentTier::Ma1000);
}

#[test]
fn nothing_attached_suspends_usb_input() {
    let (pmu, bus, _platform) = new_pmu(fast_config());
    block_on(attach(&pmu));
    assert_eq!(usb_tier(&bus), UsbCurrentTier::Suspend.bits());
    assert_eq!(pmu.last_current_limit(), 0);
    assert!(!pmu.flags().contains(StatusFlags::CHG_ENABLED));
}

#[test]
fn set_current_limit_pulses_resume_and_opens_fast_charge() {
    let (pmu, bus, _platform) = new_pmu(fast_config());
    bus.usb_power(true);
    block_on(async {
        attach(&pmu).await;
        bus.0.borrow_mut().writes.clear();
        pmu.set_current_limit(500).await.unwrap();
    });
    let mbcc1 = bus.0.borrow().writes_to(addr::MBCC1);
    let autores = Mbcc1::AUTORES.bits();
    let resume = Mbcc1::RESUME.bits();
    // CHGENA, AUTORES off, RESUME on, AUTORES on.
    assert_eq!(mbcc1.len(), 4);
    assert_eq!(mbcc1[1][0] & autores, 0);
    assert_eq!(mbcc1[2][0] & resume, resume);
    assert_eq!(mbcc1[3][0] & autores, autores);
    assert_eq!(bus.0.borrow().writes_to(addr::MBCC5).last(), Some(&vec![0xFF]));
    assert_eq!(usb_tier(&bus), UsbCurrentTier::Ma500.bits());
}

#[test]
fn usb_current_limit_reads_back_tier() {
    let (pmu, bus, _platform) = new_pmu(fast_config());
    bus.usb_power(true);
    let tier = block_on(async {
        attach(&pmu).await;
        pmu.set_current_limit(1000).await.unwrap();
        pmu.usb_current_limit().await
    });
    assert_eq!(tier.unwrap(), UsbCurrentTier::Ma1000);
    assert_eq!(pmu.last_current_limit(), 1000);
}

#[test]
fn charge_enable_is_idempotent() {
    let (pmu, bus, platform) = new_pmu(fast_config());
    bus.usb_power(true);
    block_on(async {
        attach(&pmu).await;
        pmu.set_current_limit(500).await.unwrap();
        platform.clear();
        pmu.charge_enable(true).await.unwrap();
        pmu.charge_enable(true).await.unwrap();
    });
    assert!(pmu.flags().contains(StatusFlags::CHG_ENABLED));
    assert!(platform.events().is_empty());

    block_on(async {
        pmu.charge_enable(false).await.unwrap();
        pmu.charge_enable(false).await.unwrap();
    });
    assert_eq!(platform.events(), [PmuEvent::ChargerIdle]);
    assert_eq!(bus.reg(addr::MBCC1) & Mbcc1::CHGENA.bits(), 0);
}

#[test]
fn charge_enable_without_charger_feature_does_nothing() {
    let (pmu, bus, platform) = new_pmu(fast_config().with_features(Features::RTC));
    bus.usb_power(true);
    block_on(async {
        pmu.init().await.unwrap();
        let before = bus.transactions();
        pmu.charge_enable(true).await.unwrap();
        assert_eq!(bus.transactions(), before);
    });
    assert!(!pmu.flags().contains(StatusFlags::CHG_ENABLED));
    assert!(platform.events().is_empty());
}

#[test]
fn host_limit_restored_after_replug() {
    let (pmu, bus, _platform) = new_pmu(fast_config());
    bus.usb_power(true);
    block_on(async {
        attach(&pmu).await;
        pmu.notify_current_limit(500);
        assert_eq!(pmu.process_current_limit().await, DispatchOutcome::Serviced);
        assert_eq!(usb_tier(&bus), UsbCurrentTier::Ma500.bits());

        // Unplug: removal handled, then charger detection sees nothing.
        bus.usb_power(false);
        bus.raise(0, 0x08);
        pmu.dispatch().await;
        assert_eq!(pmu.last_current_limit(), 0);
        pmu.dispatch().await;
        assert_eq!(usb_tier(&bus), UsbCurrentTier::Suspend.bits());

        // Replug into a host port.
        bus.usb_power(true);
        bus.raise(0, 0x04);
        pmu.dispatch().await;
        pmu.dispatch().await;
    });
    assert_eq!(usb_tier(&bus), UsbCurrentTier::Ma100.bits());
    assert_eq!(pmu.usb_removal_count(), 1);
}

#[test]
fn host_keeps_granted_limit_on_redetect() {
    let (pmu, bus, _platform) = new_pmu(fast_config());
    bus.usb_power(true);
    block_on(async {
        attach(&pmu).await;
        pmu.set_current_limit(500).await.unwrap();
        pmu.apply_charger_type(ChargerType::HostUsb).await.unwrap();
    });
    assert_eq!(usb_tier(&bus), UsbCurrentTier::Ma500.bits());
}

#[test]
fn stale_current_limit_is_dropped_after_removal() {
    let (pmu, bus, _platform) = new_pmu(fast_config());
    bus.usb_power(true);
    block_on(async {
        attach(&pmu).await;
        pmu.notify_current_limit(1000);
        bus.usb_power(false);
        bus.raise(0, 0x08);
        pmu.dispatch().await;
        pmu.dispatch().await;
        assert_eq!(pmu.process_current_limit().await, DispatchOutcome::Skipped);
    });
    assert_eq!(usb_tier(&bus), UsbCurrentTier::Suspend.bits());
}

#[test]
fn current_limit_waits_for_init() {
    let (pmu, bus, _platform) = new_pmu(fast_config());
    pmu.notify_current_limit(500);
    assert_eq!(block_on(pmu.process_current_limit()), DispatchOutcome::Rescheduled);
    assert_eq!(bus.transactions(), 0);
}

#[test]
fn charger_adc_reports_raw_id_sample() {
    let (pmu, bus, _platform) = new_pmu(fast_config());
    bus.set_adc_sample(MUX_ADCIN1, SAMPLE_NOTHING);
    let sample = block_on(async {
        attach(&pmu).await;
        let (sample, _) = join(pmu.charger_adc(), async {
            while pmu.adc_pending() == 0 {
                yield_now().await;
            }
            pmu.dispatch().await;
        })
        .await;
        sample
    });
    assert_eq!(sample.unwrap(), SAMPLE_NOTHING);
}

#[test]
fn charge_mode_controls() {
    let (pmu, bus, platform) = new_pmu(fast_config());
    bus.usb_power(true);
    block_on(async {
        attach(&pmu).await;
        pmu.force_usb_limit_dangerous(1000).await.unwrap();
        assert_eq!(usb_tier(&bus), UsbCurrentTier::Ma1000.bits());
        assert_eq!(pmu.charge_state().collect::<Vec<_>>(), ["enabled", "usb_present"]);

        platform.clear();
        pmu.set_charge_mode(false).await.unwrap();
    });
    assert_eq!(bus.reg(addr::MBCC1) & Mbcc1::CHGENA.bits(), 0);
    assert_eq!(platform.events(), [PmuEvent::ChargerIdle]);
    assert_eq!(pmu.charge_state().collect::<Vec<_>>(), ["usb_present"]);
}
