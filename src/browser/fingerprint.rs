//! Browser identity: headers and script-level property overrides.
//!
//! The header set and the stealth script are fixed, versioned templates. The
//! script is passed opaquely to the page as a new-document script; nothing in
//! it is constructed dynamically.

/// User agent presented by every context.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Chrome-shaped request headers applied to every context.
///
/// The user agent itself is set through the CDP user-agent override, not here,
/// so the two never disagree.
pub fn chrome_headers() -> serde_json::Value {
    serde_json::json!({
        "sec-ch-ua": "\"Chromium\";v=\"126\", \"Google Chrome\";v=\"126\", \"Not-A.Brand\";v=\"99\"",
        "sec-ch-ua-mobile": "?0",
        "sec-ch-ua-platform": "\"Windows\"",
        "upgrade-insecure-requests": "1",
        "accept": "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        "sec-fetch-site": "none",
        "sec-fetch-mode": "navigate",
        "sec-fetch-user": "?1",
        "sec-fetch-dest": "document",
        "accept-language": "en-US,en;q=0.9"
    })
}

/// Stealth overrides injected before any page script runs.
///
/// Covers the automation marker, GPU renderer strings, canvas/audio noise, and
/// WebRTC (real-IP leak prevention).
pub const STEALTH_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => false });
window.chrome = { runtime: {}, loadTimes: () => {}, csi: () => {}, app: {} };

const originalGetParameter = WebGLRenderingContext.prototype.getParameter;
WebGLRenderingContext.prototype.getParameter = function(parameter) {
    if (parameter === 37445) return 'Intel Inc.';
    if (parameter === 37446) return 'Intel Iris OpenGL Engine';
    return originalGetParameter.apply(this, arguments);
};

const originalGetImageData = CanvasRenderingContext2D.prototype.getImageData;
CanvasRenderingContext2D.prototype.getImageData = function(...args) {
    const result = originalGetImageData.apply(this, args);
    for (let i = 0; i < result.data.length; i += 4) {
        result.data[i] += Math.floor(Math.random() * 3) - 1;
        result.data[i + 1] += Math.floor(Math.random() * 3) - 1;
        result.data[i + 2] += Math.floor(Math.random() * 3) - 1;
    }
    return result;
};

const originalGetFrequencyData = AnalyserNode.prototype.getFloatFrequencyData;
AnalyserNode.prototype.getFloatFrequencyData = function(array) {
    const result = originalGetFrequencyData.apply(this, arguments);
    for (let i = 0; i < array.length; i++) {
        array[i] += (Math.random() * 0.1) - 0.05;
    }
    return result;
};

if (window.RTCPeerConnection) {
    const origPeerConnection = window.RTCPeerConnection;
    window.RTCPeerConnection = function(...args) {
        const pc = new origPeerConnection(...args);
        pc.close = () => {};
        return pc;
    };
    window.RTCPeerConnection.prototype = origPeerConnection.prototype;
}
window.webkitRTCPeerConnection = window.mozRTCPeerConnection = window.RTCPeerConnection;
navigator.mediaDevices = undefined;
"#;
