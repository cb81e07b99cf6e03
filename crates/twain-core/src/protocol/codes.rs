//! Numeric code tables of the protocol.
//!
//! Every code travels as a `u16` (or `u32`) on the wire but is handled as a
//! typed enum inside the crate. Each table also carries the symbolic name used
//! by the text codec and in logs.

/// Defines a fieldless enum backed by a protocol code and a symbolic name.
macro_rules! code_table {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $code:expr => $sym:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every value of the table, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire code.
            pub const fn code(self) -> $repr {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            /// Look up a value by wire code.
            pub fn from_code(code: $repr) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.code() == code)
            }

            /// Symbolic name.
            pub const fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $sym,)+
                }
            }

            /// Look up a value by symbolic name (case-insensitive).
            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name().eq_ignore_ascii_case(name))
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

pub(crate) use code_table;

code_table! {
    /// Data group of an operation (DG_*).
    pub enum DataGroup: u32 {
        Control = 0x0001 => "DG_CONTROL",
        Image = 0x0002 => "DG_IMAGE",
        Audio = 0x0004 => "DG_AUDIO",
    }
}

code_table! {
    /// Operation category (DAT_*). Selects the payload shape.
    pub enum Category: u16 {
        Null = 0x0000 => "DAT_NULL",
        Capability = 0x0001 => "DAT_CAPABILITY",
        Event = 0x0002 => "DAT_EVENT",
        Identity = 0x0003 => "DAT_IDENTITY",
        Parent = 0x0004 => "DAT_PARENT",
        PendingXfers = 0x0005 => "DAT_PENDINGXFERS",
        SetupMemXfer = 0x0006 => "DAT_SETUPMEMXFER",
        SetupFileXfer = 0x0007 => "DAT_SETUPFILEXFER",
        Status = 0x0008 => "DAT_STATUS",
        UserInterface = 0x0009 => "DAT_USERINTERFACE",
        XferGroup = 0x000a => "DAT_XFERGROUP",
        CustomDsData = 0x000c => "DAT_CUSTOMDSDATA",
        DeviceEvent = 0x000d => "DAT_DEVICEEVENT",
        FileSystem = 0x000e => "DAT_FILESYSTEM",
        PassThru = 0x000f => "DAT_PASSTHRU",
        Callback = 0x0010 => "DAT_CALLBACK",
        StatusUtf8 = 0x0011 => "DAT_STATUSUTF8",
        Callback2 = 0x0012 => "DAT_CALLBACK2",
        Metrics = 0x0013 => "DAT_METRICS",
        TwainDirect = 0x0014 => "DAT_TWAINDIRECT",
        ImageInfo = 0x0101 => "DAT_IMAGEINFO",
        ImageLayout = 0x0102 => "DAT_IMAGELAYOUT",
        ImageMemXfer = 0x0103 => "DAT_IMAGEMEMXFER",
        ImageNativeXfer = 0x0104 => "DAT_IMAGENATIVEXFER",
        ImageFileXfer = 0x0105 => "DAT_IMAGEFILEXFER",
        CieColor = 0x0106 => "DAT_CIECOLOR",
        GrayResponse = 0x0107 => "DAT_GRAYRESPONSE",
        RgbResponse = 0x0108 => "DAT_RGBRESPONSE",
        JpegCompression = 0x0109 => "DAT_JPEGCOMPRESSION",
        Palette8 = 0x010a => "DAT_PALETTE8",
        ExtImageInfo = 0x010b => "DAT_EXTIMAGEINFO",
        Filter = 0x010c => "DAT_FILTER",
        AudioFileXfer = 0x0201 => "DAT_AUDIOFILEXFER",
        AudioInfo = 0x0202 => "DAT_AUDIOINFO",
        AudioNativeXfer = 0x0203 => "DAT_AUDIONATIVEXFER",
        IccProfile = 0x0401 => "DAT_ICCPROFILE",
        ImageMemFileXfer = 0x0402 => "DAT_IMAGEMEMFILEXFER",
        EntryPoint = 0x0403 => "DAT_ENTRYPOINT",
    }
}

impl Category {
    /// Categories whose successful completion hands over image or audio data.
    pub fn is_transfer(self) -> bool {
        matches!(
            self,
            Category::ImageNativeXfer
                | Category::ImageMemXfer
                | Category::ImageFileXfer
                | Category::ImageMemFileXfer
                | Category::AudioNativeXfer
                | Category::AudioFileXfer
        )
    }
}

code_table! {
    /// Operation verb (MSG_*).
    pub enum Message: u16 {
        Null = 0x0000 => "MSG_NULL",
        Get = 0x0001 => "MSG_GET",
        GetCurrent = 0x0002 => "MSG_GETCURRENT",
        GetDefault = 0x0003 => "MSG_GETDEFAULT",
        GetFirst = 0x0004 => "MSG_GETFIRST",
        GetNext = 0x0005 => "MSG_GETNEXT",
        Set = 0x0006 => "MSG_SET",
        Reset = 0x0007 => "MSG_RESET",
        QuerySupport = 0x0008 => "MSG_QUERYSUPPORT",
        GetHelp = 0x0009 => "MSG_GETHELP",
        GetLabel = 0x000a => "MSG_GETLABEL",
        GetLabelEnum = 0x000b => "MSG_GETLABELENUM",
        SetConstraint = 0x000c => "MSG_SETCONSTRAINT",
        XferReady = 0x0101 => "MSG_XFERREADY",
        CloseDsReq = 0x0102 => "MSG_CLOSEDSREQ",
        CloseDsOk = 0x0103 => "MSG_CLOSEDSOK",
        DeviceEvent = 0x0104 => "MSG_DEVICEEVENT",
        OpenDsm = 0x0301 => "MSG_OPENDSM",
        CloseDsm = 0x0302 => "MSG_CLOSEDSM",
        OpenDs = 0x0401 => "MSG_OPENDS",
        CloseDs = 0x0402 => "MSG_CLOSEDS",
        UserSelect = 0x0403 => "MSG_USERSELECT",
        DisableDs = 0x0501 => "MSG_DISABLEDS",
        EnableDs = 0x0502 => "MSG_ENABLEDS",
        EnableDsUiOnly = 0x0503 => "MSG_ENABLEDSUIONLY",
        ProcessEvent = 0x0601 => "MSG_PROCESSEVENT",
        EndXfer = 0x0701 => "MSG_ENDXFER",
        StopFeeder = 0x0702 => "MSG_STOPFEEDER",
        ChangeDirectory = 0x0801 => "MSG_CHANGEDIRECTORY",
        CreateDirectory = 0x0802 => "MSG_CREATEDIRECTORY",
        Delete = 0x0803 => "MSG_DELETE",
        FormatMedia = 0x0804 => "MSG_FORMATMEDIA",
        GetClose = 0x0805 => "MSG_GETCLOSE",
        GetFirstFile = 0x0806 => "MSG_GETFIRSTFILE",
        GetInfo = 0x0807 => "MSG_GETINFO",
        GetNextFile = 0x0808 => "MSG_GETNEXTFILE",
        Rename = 0x0809 => "MSG_RENAME",
        Copy = 0x080a => "MSG_COPY",
        AutomaticCaptureDirectory = 0x080b => "MSG_AUTOMATICCAPTUREDIRECTORY",
        PassThru = 0x0901 => "MSG_PASSTHRU",
        RegisterCallback = 0x0902 => "MSG_REGISTER_CALLBACK",
        ResetAll = 0x0a01 => "MSG_RESETALL",
    }
}

code_table! {
    /// Return code of a native call (TWRC_*).
    pub enum ReturnCode: u16 {
        Success = 0 => "TWRC_SUCCESS",
        Failure = 1 => "TWRC_FAILURE",
        CheckStatus = 2 => "TWRC_CHECKSTATUS",
        Cancel = 3 => "TWRC_CANCEL",
        DsEvent = 4 => "TWRC_DSEVENT",
        NotDsEvent = 5 => "TWRC_NOTDSEVENT",
        XferDone = 6 => "TWRC_XFERDONE",
        EndOfList = 7 => "TWRC_ENDOFLIST",
        InfoNotSupported = 8 => "TWRC_INFONOTSUPPORTED",
        DataNotAvailable = 9 => "TWRC_DATANOTAVAILABLE",
        Busy = 10 => "TWRC_BUSY",
        ScannerLocked = 11 => "TWRC_SCANNERLOCKED",
    }
}

code_table! {
    /// Condition code reported by a status query after a failure (TWCC_*).
    pub enum ConditionCode: u16 {
        Success = 0 => "TWCC_SUCCESS",
        Bummer = 1 => "TWCC_BUMMER",
        LowMemory = 2 => "TWCC_LOWMEMORY",
        NoDs = 3 => "TWCC_NODS",
        MaxConnections = 4 => "TWCC_MAXCONNECTIONS",
        OperationError = 5 => "TWCC_OPERATIONERROR",
        BadCap = 6 => "TWCC_BADCAP",
        BadProtocol = 9 => "TWCC_BADPROTOCOL",
        BadValue = 10 => "TWCC_BADVALUE",
        SeqError = 11 => "TWCC_SEQERROR",
        BadDest = 12 => "TWCC_BADDEST",
        CapUnsupported = 13 => "TWCC_CAPUNSUPPORTED",
        CapBadOperation = 14 => "TWCC_CAPBADOPERATION",
        CapSeqError = 15 => "TWCC_CAPSEQERROR",
        Denied = 16 => "TWCC_DENIED",
        FileExists = 17 => "TWCC_FILEEXISTS",
        FileNotFound = 18 => "TWCC_FILENOTFOUND",
        NotEmpty = 19 => "TWCC_NOTEMPTY",
        PaperJam = 20 => "TWCC_PAPERJAM",
        PaperDoubleFeed = 21 => "TWCC_PAPERDOUBLEFEED",
        FileWriteError = 22 => "TWCC_FILEWRITEERROR",
        CheckDeviceOnline = 23 => "TWCC_CHECKDEVICEONLINE",
        Interlock = 24 => "TWCC_INTERLOCK",
        DamagedCorner = 25 => "TWCC_DAMAGEDCORNER",
        FocusError = 26 => "TWCC_FOCUSERROR",
        DocTooLight = 27 => "TWCC_DOCTOOLIGHT",
        DocTooDark = 28 => "TWCC_DOCTOODARK",
        NoMedia = 29 => "TWCC_NOMEDIA",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_lookup() {
        assert_eq!(Message::from_code(0x0502), Some(Message::EnableDs));
        assert_eq!(Category::from_code(0x0104), Some(Category::ImageNativeXfer));
        assert_eq!(Category::from_code(0x7777), None);
        assert_eq!(ReturnCode::XferDone.code(), 6);
    }

    #[test]
    fn test_name_lookup_is_case_insensitive() {
        assert_eq!(Message::from_name("msg_opendsm"), Some(Message::OpenDsm));
        assert_eq!(ConditionCode::from_name("TWCC_SEQERROR"), Some(ConditionCode::SeqError));
        assert_eq!(DataGroup::Image.to_string(), "DG_IMAGE");
    }

    #[test]
    fn test_transfer_categories() {
        assert!(Category::ImageMemXfer.is_transfer());
        assert!(Category::AudioFileXfer.is_transfer());
        assert!(!Category::PendingXfers.is_transfer());
    }
}
