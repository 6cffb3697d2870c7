//! Sub-op bytes for multi-function opcodes, grouped by numbering family.

/// HE 60 to 71.
pub mod classic {
    pub const RESOURCE_LOAD_SCRIPT: i32 = 100;
    pub const RESOURCE_LOAD_SOUND: i32 = 101;
    pub const RESOURCE_LOAD_COSTUME: i32 = 102;
    pub const RESOURCE_LOAD_ROOM: i32 = 103;
    pub const RESOURCE_NUKE_SCRIPT: i32 = 104;
    pub const RESOURCE_NUKE_SOUND: i32 = 105;
    pub const RESOURCE_NUKE_COSTUME: i32 = 106;
    pub const RESOURCE_NUKE_ROOM: i32 = 107;
    pub const RESOURCE_LOCK_SCRIPT: i32 = 108;
    pub const RESOURCE_LOCK_SOUND: i32 = 109;
    pub const RESOURCE_LOCK_COSTUME: i32 = 110;
    pub const RESOURCE_LOCK_ROOM: i32 = 111;
    pub const RESOURCE_UNLOCK_SCRIPT: i32 = 112;
    pub const RESOURCE_UNLOCK_SOUND: i32 = 113;
    pub const RESOURCE_UNLOCK_COSTUME: i32 = 114;
    pub const RESOURCE_UNLOCK_ROOM: i32 = 115;
    pub const RESOURCE_CLEAR_HEAP: i32 = 116;
    pub const RESOURCE_LOAD_CHARSET: i32 = 117;
    pub const RESOURCE_NUKE_CHARSET: i32 = 118;
    pub const RESOURCE_LOAD_OBJECT: i32 = 119;

    pub const DIM_INT: i32 = 199;
    pub const DIM_BIT: i32 = 200;
    pub const DIM_NIBBLE: i32 = 201;
    pub const DIM_BYTE: i32 = 202;
    pub const DIM_STRING: i32 = 203;
    pub const UNDIM: i32 = 204;

    pub const ARRAY_STRING: i32 = 205;
    pub const ARRAY_INT_LIST: i32 = 208;
    pub const ARRAY_2DIM_LIST: i32 = 212;

    pub const SYSTEM_RESTART: i32 = 158;
    pub const SYSTEM_PAUSE: i32 = 159;
    pub const SYSTEM_QUIT: i32 = 160;

    pub const SOUND_SOFT: i32 = 9;
    pub const SOUND_VARIABLE: i32 = 23;
    pub const SOUND_VOLUME: i32 = 25;
    pub const SOUND_QUICK_START: i32 = 56;
    pub const SOUND_APPEND: i32 = 164;
    pub const SOUND_NOP: i32 = 222;
    pub const SOUND_FREQUENCY: i32 = 224;
    pub const SOUND_CHANNEL: i32 = 230;
    pub const SOUND_OFFSET: i32 = 231;
    pub const SOUND_START: i32 = 232;
    pub const SOUND_LOOP: i32 = 245;
    pub const SOUND_END: i32 = 255;
}

/// HE 72 to 99.
pub mod he72 {
    pub const DIM_BIT: i32 = 2;
    pub const DIM_NIBBLE: i32 = 3;
    pub const DIM_BYTE: i32 = 4;
    pub const DIM_INT: i32 = 5;
    pub const DIM_DWORD: i32 = 6;
    pub const DIM_STRING: i32 = 7;
    pub const UNDIM: i32 = 204;

    pub const ARRAY_STRING: i32 = 7;
    pub const ARRAY_COMPLEX_ASSIGNMENT: i32 = 126;
    pub const ARRAY_COMPLEX_COPY: i32 = 127;
    pub const ARRAY_RANGE_ASSIGNMENT: i32 = 128;
    pub const ARRAY_COMPLEX_MATH: i32 = 138;
    pub const ARRAY_FORMATTED_STRING: i32 = 194;
    pub const ARRAY_INT_LIST: i32 = 208;
    pub const ARRAY_2DIM_LIST: i32 = 212;

    pub const SCRIPT_REC: i32 = 195;
    pub const SCRIPT_BAK: i32 = 199;
    pub const SCRIPT_BAKREC: i32 = 200;

    pub const TIMER_GET: i32 = 10;
    pub const TIMER_GET_ALT: i32 = 50;
    pub const TIMER_RESET: i32 = 158;
    pub const TIMER_RESET_ALT: i32 = 61;

    pub const SIZE_SOUND: i32 = 13;
    pub const SIZE_ROOM: i32 = 14;
    pub const SIZE_IMAGE: i32 = 15;
    pub const SIZE_COSTUME: i32 = 16;
    pub const SIZE_SCRIPT: i32 = 17;

    pub const SYSTEM_FLUSH_DRAW_QUEUE: i32 = 22;
    pub const SYSTEM_RESTART: i32 = 158;
    pub const SYSTEM_QUIT: i32 = 160;
    pub const SYSTEM_QUIT_QUIT: i32 = 244;
    pub const SYSTEM_RESTART_STRING: i32 = 251;
    pub const SYSTEM_START_STRING: i32 = 252;

    pub const SORT: i32 = 129;

    pub const DIST_2D: i32 = 28;
    pub const DIST_3D: i32 = 29;

    pub const DIMSIZE_ACROSS: i32 = 1;
    pub const DIMSIZE_DOWN: i32 = 2;
    pub const DIMSIZE_ACROSS_ALT: i32 = 3;
    pub const DIMSIZE_ACROSS_MIN: i32 = 4;
    pub const DIMSIZE_ACROSS_MAX: i32 = 5;
    pub const DIMSIZE_DOWN_MIN: i32 = 6;
    pub const DIMSIZE_DOWN_MAX: i32 = 7;

    pub const CREATE_INIT: i32 = 27;
    pub const CREATE_NEW: i32 = 217;
    pub const CREATE_ADD: i32 = 232;
    pub const CREATE_END: i32 = 255;
}

/// HE 100.
pub mod he100 {
    pub const INIT: i32 = 0;
    pub const AT: i32 = 6;
    pub const BIT: i32 = 11;
    pub const BYTE: i32 = 12;
    pub const CHARSET_SET: i32 = 14;
    pub const CLEAR_HEAP: i32 = 15;
    pub const ASSIGN_2DIM_LIST: i32 = 16;
    pub const ASSIGN_INT_LIST: i32 = 17;
    pub const COMPLEX_ARRAY_ASSIGNMENT: i32 = 20;
    pub const COMPLEX_ARRAY_COPY: i32 = 21;
    pub const COMPLEX_ARRAY_MATH: i32 = 22;
    pub const COSTUME: i32 = 25;
    pub const DWORD: i32 = 35;
    pub const FORMATTED_STRING: i32 = 38;
    pub const FLOBJECT: i32 = 39;
    pub const IMAGE: i32 = 40;
    pub const INT: i32 = 41;
    pub const LOAD: i32 = 47;
    pub const LOCK: i32 = 48;
    pub const NEW: i32 = 53;
    pub const NIBBLE: i32 = 54;
    pub const NOW: i32 = 55;
    pub const NUKE: i32 = 56;
    pub const OFF_HEAP: i32 = 57;
    pub const ON_HEAP: i32 = 58;
    pub const PRELOAD: i32 = 59;
    pub const PRELOAD_FLUSH: i32 = 60;
    pub const QUIT: i32 = 61;
    pub const QUIT_QUIT: i32 = 62;
    pub const RESTART: i32 = 63;
    pub const RESTART_STRING: i32 = 64;
    pub const ROOM: i32 = 65;
    pub const SCRIPT: i32 = 66;
    pub const RANGE_ARRAY_ASSIGNMENT: i32 = 67;
    pub const REC: i32 = 68;
    pub const BAK: i32 = 69;
    pub const BAKREC: i32 = 70;
    pub const SOUND: i32 = 72;
    pub const START_SYSTEM_STRING: i32 = 73;
    pub const FLUSH_OBJECT_DRAW_QUEUE: i32 = 74;
    pub const STRING: i32 = 77;
    pub const UNDIM_ARRAY: i32 = 79;
    pub const UNLOCK: i32 = 80;
    pub const UPDATE_SCREEN: i32 = 81;
    pub const VARIABLE: i32 = 83;
    pub const END: i32 = 92;
    pub const SOUND_ADD: i32 = 128;
    pub const SOUND_CHANNEL: i32 = 129;
    pub const SOUND_FREQUENCY: i32 = 130;
    pub const SOUND_LOOPING: i32 = 131;
    pub const SOUND_MODIFY: i32 = 132;
    pub const SOUND_PAN: i32 = 133;
    pub const SOUND_START: i32 = 134;
    pub const SORT: i32 = 134;
    pub const SOUND_SOFT: i32 = 135;
    pub const SOUND_VOLUME: i32 = 136;

    pub const DIST_2D: i32 = 23;
    pub const DIST_3D: i32 = 24;
}
