// 7.3" six-color panel controller command definitions

// Panel and power setup
pub const PANEL_SETTING: u8 = 0x00; // PSR
pub const POWER_SETTING: u8 = 0x01; // PWR
pub const POWER_OFF: u8 = 0x02; // POF
pub const POWER_OFF_SEQUENCE: u8 = 0x03; // PFS
pub const POWER_ON: u8 = 0x04; // PON
pub const BOOSTER_SOFT_START_1: u8 = 0x05; // BTST1
pub const BOOSTER_SOFT_START_2: u8 = 0x06; // BTST2
pub const DEEP_SLEEP: u8 = 0x07; // DSLP
pub const BOOSTER_SOFT_START_3: u8 = 0x08; // BTST3
pub const COMMAND_HEADER: u8 = 0xAA; // CMDH, unlocks the extended register set

// Frame transfer and refresh
pub const DATA_START_TRANSMISSION: u8 = 0x10; // DTM, followed by the packed frame
pub const DISPLAY_REFRESH: u8 = 0x12; // DRF

// Timing, resolution and waveform
pub const PLL_CONTROL: u8 = 0x30; // PLL
pub const VCOM_DATA_INTERVAL: u8 = 0x50; // CDI
pub const TCON_SETTING: u8 = 0x60; // TCON
pub const RESOLUTION_SETTING: u8 = 0x61; // TRES
pub const VCOM_DC_SETTING: u8 = 0x84; // T_VDCS
pub const POWER_SAVING: u8 = 0xE3; // PWS

// Parameters
pub const DEEP_SLEEP_CHECK: u8 = 0xA5; // Required by DSLP to enter sleep
pub const BOOSTER_2_REFRESH: [u8; 4] = [0x6F, 0x1F, 0x17, 0x49];

/// Initialization stream sent after reset, before power-on
///
/// Resolution bytes are 800 (0x0320) by 480 (0x01E0), big-endian.
pub const INIT_SEQUENCE: &[(u8, &[u8])] = &[
    (COMMAND_HEADER, &[0x49, 0x55, 0x20, 0x08, 0x09, 0x18]),
    (POWER_SETTING, &[0x3F]),
    (PANEL_SETTING, &[0x5F, 0x69]),
    (POWER_OFF_SEQUENCE, &[0x00, 0x54, 0x00, 0x44]),
    (BOOSTER_SOFT_START_1, &[0x40, 0x1F, 0x1F, 0x2C]),
    (BOOSTER_SOFT_START_2, &BOOSTER_2_REFRESH),
    (BOOSTER_SOFT_START_3, &[0x6F, 0x1F, 0x1F, 0x22]),
    (PLL_CONTROL, &[0x03]),
    (VCOM_DATA_INTERVAL, &[0x3F]),
    (TCON_SETTING, &[0x02, 0x00]),
    (RESOLUTION_SETTING, &[0x03, 0x20, 0x01, 0xE0]),
    (VCOM_DC_SETTING, &[0x01]),
    (POWER_SAVING, &[0x2F]),
];
