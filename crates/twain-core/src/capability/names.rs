//! Capability ids and their symbolic names.

use std::fmt;

use super::CodecError;

/// Numeric capability code (CAP_*, ICAP_*, ACAP_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityId(pub u16);

/// Lowest id a driver may use for its own capabilities.
pub const CUSTOM_BASE: u16 = 0x8000;

static NAMES: &[(u16, &str)] = &[
    (0x0001, "CAP_XFERCOUNT"),
    (0x0100, "ICAP_COMPRESSION"),
    (0x0101, "ICAP_PIXELTYPE"),
    (0x0102, "ICAP_UNITS"),
    (0x0103, "ICAP_XFERMECH"),
    (0x1000, "CAP_AUTHOR"),
    (0x1001, "CAP_CAPTION"),
    (0x1002, "CAP_FEEDERENABLED"),
    (0x1003, "CAP_FEEDERLOADED"),
    (0x1004, "CAP_TIMEDATE"),
    (0x1005, "CAP_SUPPORTEDCAPS"),
    (0x1006, "CAP_EXTENDEDCAPS"),
    (0x1007, "CAP_AUTOFEED"),
    (0x1008, "CAP_CLEARPAGE"),
    (0x1009, "CAP_FEEDPAGE"),
    (0x100a, "CAP_REWINDPAGE"),
    (0x100b, "CAP_INDICATORS"),
    (0x100d, "CAP_PAPERDETECTABLE"),
    (0x100e, "CAP_UICONTROLLABLE"),
    (0x100f, "CAP_DEVICEONLINE"),
    (0x1010, "CAP_AUTOSCAN"),
    (0x1011, "CAP_THUMBNAILSENABLED"),
    (0x1012, "CAP_DUPLEX"),
    (0x1013, "CAP_DUPLEXENABLED"),
    (0x1014, "CAP_ENABLEDSUIONLY"),
    (0x1015, "CAP_CUSTOMDSDATA"),
    (0x1016, "CAP_ENDORSER"),
    (0x1017, "CAP_JOBCONTROL"),
    (0x1018, "CAP_ALARMS"),
    (0x1019, "CAP_ALARMVOLUME"),
    (0x101a, "CAP_AUTOMATICCAPTURE"),
    (0x101b, "CAP_TIMEBEFOREFIRSTCAPTURE"),
    (0x101c, "CAP_TIMEBETWEENCAPTURES"),
    (0x101d, "CAP_CLEARBUFFERS"),
    (0x101e, "CAP_MAXBATCHBUFFERS"),
    (0x101f, "CAP_DEVICETIMEDATE"),
    (0x1020, "CAP_POWERSUPPLY"),
    (0x1021, "CAP_CAMERAPREVIEWUI"),
    (0x1022, "CAP_DEVICEEVENT"),
    (0x1024, "CAP_SERIALNUMBER"),
    (0x1026, "CAP_PRINTER"),
    (0x1027, "CAP_PRINTERENABLED"),
    (0x1028, "CAP_PRINTERINDEX"),
    (0x1029, "CAP_PRINTERMODE"),
    (0x102a, "CAP_PRINTERSTRING"),
    (0x102b, "CAP_PRINTERSUFFIX"),
    (0x102c, "CAP_LANGUAGE"),
    (0x102d, "CAP_FEEDERALIGNMENT"),
    (0x102e, "CAP_FEEDERORDER"),
    (0x1030, "CAP_REACQUIREALLOWED"),
    (0x1032, "CAP_BATTERYMINUTES"),
    (0x1033, "CAP_BATTERYPERCENTAGE"),
    (0x1034, "CAP_CAMERASIDE"),
    (0x1035, "CAP_SEGMENTED"),
    (0x1036, "CAP_CAMERAENABLED"),
    (0x1037, "CAP_CAMERAORDER"),
    (0x1038, "CAP_MICRENABLED"),
    (0x1039, "CAP_FEEDERPREP"),
    (0x103a, "CAP_FEEDERPOCKET"),
    (0x103b, "CAP_AUTOMATICSENSEMEDIUM"),
    (0x103c, "CAP_CUSTOMINTERFACEGUID"),
    (0x103d, "CAP_SUPPORTEDCAPSSEGMENTUNIQUE"),
    (0x103e, "CAP_SUPPORTEDDATS"),
    (0x103f, "CAP_DOUBLEFEEDDETECTION"),
    (0x1040, "CAP_DOUBLEFEEDDETECTIONLENGTH"),
    (0x1041, "CAP_DOUBLEFEEDDETECTIONSENSITIVITY"),
    (0x1042, "CAP_DOUBLEFEEDDETECTIONRESPONSE"),
    (0x1043, "CAP_PAPERHANDLING"),
    (0x1044, "CAP_INDICATORSMODE"),
    (0x1045, "CAP_PRINTERVERTICALOFFSET"),
    (0x1046, "CAP_POWERSAVETIME"),
    (0x1047, "CAP_PRINTERCHARROTATION"),
    (0x1048, "CAP_PRINTERFONTSTYLE"),
    (0x1049, "CAP_PRINTERINDEXLEADCHAR"),
    (0x104a, "CAP_PRINTERINDEXMAXVALUE"),
    (0x104b, "CAP_PRINTERINDEXNUMDIGITS"),
    (0x104c, "CAP_PRINTERINDEXSTEP"),
    (0x104d, "CAP_PRINTERINDEXTRIGGER"),
    (0x104e, "CAP_PRINTERSTRINGPREVIEW"),
    (0x104f, "CAP_SHEETCOUNT"),
    (0x1100, "ICAP_AUTOBRIGHT"),
    (0x1101, "ICAP_BRIGHTNESS"),
    (0x1103, "ICAP_CONTRAST"),
    (0x1104, "ICAP_CUSTHALFTONE"),
    (0x1105, "ICAP_EXPOSURETIME"),
    (0x1106, "ICAP_FILTER"),
    (0x1107, "ICAP_FLASHUSED"),
    (0x1108, "ICAP_GAMMA"),
    (0x1109, "ICAP_HALFTONES"),
    (0x110a, "ICAP_HIGHLIGHT"),
    (0x110c, "ICAP_IMAGEFILEFORMAT"),
    (0x110d, "ICAP_LAMPSTATE"),
    (0x110e, "ICAP_LIGHTSOURCE"),
    (0x1110, "ICAP_ORIENTATION"),
    (0x1111, "ICAP_PHYSICALWIDTH"),
    (0x1112, "ICAP_PHYSICALHEIGHT"),
    (0x1113, "ICAP_SHADOW"),
    (0x1114, "ICAP_FRAMES"),
    (0x1116, "ICAP_XNATIVERESOLUTION"),
    (0x1117, "ICAP_YNATIVERESOLUTION"),
    (0x1118, "ICAP_XRESOLUTION"),
    (0x1119, "ICAP_YRESOLUTION"),
    (0x111a, "ICAP_MAXFRAMES"),
    (0x111b, "ICAP_TILES"),
    (0x111c, "ICAP_BITORDER"),
    (0x111d, "ICAP_CCITTKFACTOR"),
    (0x111e, "ICAP_LIGHTPATH"),
    (0x111f, "ICAP_PIXELFLAVOR"),
    (0x1120, "ICAP_PLANARCHUNKY"),
    (0x1121, "ICAP_ROTATION"),
    (0x1122, "ICAP_SUPPORTEDSIZES"),
    (0x1123, "ICAP_THRESHOLD"),
    (0x1124, "ICAP_XSCALING"),
    (0x1125, "ICAP_YSCALING"),
    (0x1126, "ICAP_BITORDERCODES"),
    (0x1127, "ICAP_PIXELFLAVORCODES"),
    (0x1128, "ICAP_JPEGPIXELTYPE"),
    (0x112a, "ICAP_TIMEFILL"),
    (0x112b, "ICAP_BITDEPTH"),
    (0x112c, "ICAP_BITDEPTHREDUCTION"),
    (0x112d, "ICAP_UNDEFINEDIMAGESIZE"),
    (0x112e, "ICAP_IMAGEDATASET"),
    (0x112f, "ICAP_EXTIMAGEINFO"),
    (0x1130, "ICAP_MINIMUMHEIGHT"),
    (0x1131, "ICAP_MINIMUMWIDTH"),
    (0x1134, "ICAP_AUTODISCARDBLANKPAGES"),
    (0x1136, "ICAP_FLIPROTATION"),
    (0x1137, "ICAP_BARCODEDETECTIONENABLED"),
    (0x1138, "ICAP_SUPPORTEDBARCODETYPES"),
    (0x1139, "ICAP_BARCODEMAXSEARCHPRIORITIES"),
    (0x113a, "ICAP_BARCODESEARCHPRIORITIES"),
    (0x113b, "ICAP_BARCODESEARCHMODE"),
    (0x113c, "ICAP_BARCODEMAXRETRIES"),
    (0x113d, "ICAP_BARCODETIMEOUT"),
    (0x113e, "ICAP_ZOOMFACTOR"),
    (0x113f, "ICAP_PATCHCODEDETECTIONENABLED"),
    (0x1146, "ICAP_PATCHCODETIMEOUT"),
    (0x1147, "ICAP_FLASHUSED2"),
    (0x1148, "ICAP_IMAGEFILTER"),
    (0x1149, "ICAP_NOISEFILTER"),
    (0x114a, "ICAP_OVERSCAN"),
    (0x1150, "ICAP_AUTOMATICBORDERDETECTION"),
    (0x1151, "ICAP_AUTOMATICDESKEW"),
    (0x1152, "ICAP_AUTOMATICROTATE"),
    (0x1153, "ICAP_JPEGQUALITY"),
    (0x1154, "ICAP_FEEDERTYPE"),
    (0x1155, "ICAP_ICCPROFILE"),
    (0x1156, "ICAP_AUTOSIZE"),
    (0x1157, "ICAP_AUTOMATICCROPUSESFRAME"),
    (0x1158, "ICAP_AUTOMATICLENGTHDETECTION"),
    (0x1159, "ICAP_AUTOMATICCOLORENABLED"),
    (0x115a, "ICAP_AUTOMATICCOLORNONCOLORPIXELTYPE"),
    (0x115b, "ICAP_COLORMANAGEMENTENABLED"),
    (0x115c, "ICAP_IMAGEMERGE"),
    (0x115d, "ICAP_IMAGEMERGEHEIGHTTHRESHOLD"),
    (0x115e, "ICAP_SUPPORTEDEXTIMAGEINFO"),
    (0x115f, "ICAP_FILMTYPE"),
    (0x1160, "ICAP_MIRROR"),
    (0x1161, "ICAP_JPEGSUBSAMPLING"),
    (0x1201, "ACAP_XFERMECH"),
];

impl CapabilityId {
    pub const XFERCOUNT: Self = Self(0x0001);
    pub const PIXELTYPE: Self = Self(0x0101);
    pub const XFERMECH: Self = Self(0x0103);
    pub const SUPPORTEDCAPS: Self = Self(0x1005);
    pub const DEVICEEVENT: Self = Self(0x1022);
    pub const BRIGHTNESS: Self = Self(0x1101);
    pub const FRAMES: Self = Self(0x1114);
    pub const XRESOLUTION: Self = Self(0x1118);
    pub const YRESOLUTION: Self = Self(0x1119);

    /// Symbolic name, if the id is a standard one.
    pub fn name(self) -> Option<&'static str> {
        NAMES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }

    pub fn is_custom(self) -> bool {
        self.0 >= CUSTOM_BASE
    }

    /// Resolve a symbolic name.
    ///
    /// `CAP_` also resolves names that carry the image or audio prefix, so
    /// `CAP_XRESOLUTION` finds `ICAP_XRESOLUTION`.
    pub fn from_name(name: &str) -> Option<Self> {
        let lookup = |wanted: &str| {
            NAMES
                .iter()
                .find(|(_, n)| n.eq_ignore_ascii_case(wanted))
                .map(|(code, _)| Self(*code))
        };

        lookup(name).or_else(|| {
            let upper = name.to_ascii_uppercase();
            let rest = upper.strip_prefix("CAP_")?;
            lookup(&format!("ICAP_{rest}")).or_else(|| lookup(&format!("ACAP_{rest}")))
        })
    }

    /// Parse a symbolic name or a `0x` hex literal.
    pub fn parse(text: &str) -> Result<Self, CodecError> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return u16::from_str_radix(hex, 16)
                .map(Self)
                .map_err(|_| CodecError::UnknownCapability(text.to_string()));
        }
        Self::from_name(text).ok_or_else(|| CodecError::UnknownCapability(text.to_string()))
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

impl From<u16> for CapabilityId {
    fn from(code: u16) -> Self {
        Self(code)
    }
}
